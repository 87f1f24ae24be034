// src/orchestrator/state_handle.rs

//! The handle exposed to hooks and internal-API handlers.
//!
//! Per the design note on cyclic ownership: the handle is a *trait* the
//! orchestrator implements, not a struct holding a back-reference to it.
//! Hooks and handlers receive `Arc<dyn OrchestratorHandle>` and re-enter the
//! orchestrator through the trait's callable methods (`start_api`, `stop`,
//! `reload_cluster_cert`) without owning it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cert::CertMaterial;
use crate::db::ReplicatedDatabase;
use crate::error::KernelResult;
use crate::extension::Extension;
use crate::hooks::InitConfig;
use crate::os_layout::OsLayout;
use crate::trust::Remote;

/// Parameters to [`OrchestratorHandle::start_api`]: whether to bootstrap a
/// fresh cluster, the init-time hook config, an optional name/address
/// override, and the addresses to join if this is not the first member.
#[derive(Debug, Clone, Default)]
pub struct StartApiParams {
    pub bootstrap: bool,
    pub init_config: InitConfig,
    pub new_config: Option<NewConfig>,
    pub join_addresses: Vec<String>,
}

/// An address/name change supplied at `StartAPI` time.
#[derive(Debug, Clone)]
pub struct NewConfig {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Read-accessors plus re-entrant callables, consumed by hooks and by the
/// internal API's handlers. Implemented by the orchestrator; never
/// implemented by anything the orchestrator itself holds a reference to.
#[async_trait]
pub trait OrchestratorHandle: Send + Sync {
    fn name(&self) -> String;
    fn address(&self) -> String;
    fn os_layout(&self) -> OsLayout;
    fn server_cert(&self) -> CertMaterial;
    fn cluster_cert(&self) -> Option<CertMaterial>;
    fn remotes(&self) -> Vec<Remote>;
    fn extensions(&self) -> Vec<Extension>;
    fn database(&self) -> Arc<dyn ReplicatedDatabase>;

    /// Re-enters the lifecycle state machine. See [`StartApiParams`].
    async fn start_api(&self, params: StartApiParams) -> KernelResult<()>;

    /// Swaps the cluster cert and pushes it to every network endpoint.
    async fn reload_cluster_cert(&self) -> KernelResult<()>;

    /// Tears down every endpoint without touching the database or watcher.
    async fn stop_listeners(&self) -> KernelResult<()>;

    /// The exactly-once shutdown latch.
    async fn stop(&self) -> KernelResult<()>;

    /// Driven externally by an embedder's own removal handler: runs
    /// `PreRemove`, removes `name` from the trust store, runs `PostRemove`.
    /// Removing this node's own name additionally triggers the shutdown
    /// channel, so `Orchestrator::run` returns once this call completes.
    async fn remove_member(&self, name: &str, force: bool) -> KernelResult<()>;

    /// Leader-side trust-store insertion, invoked by the internal `/cluster`
    /// handler.
    async fn add_trust_store_entry(&self, remote: Remote) -> KernelResult<()>;

    /// Records an upgrade-notification PATCH. Informational only.
    fn record_upgrade_notification(&self, dqlite_version: u64);

    /// True while this node's own join is still in flight.
    fn is_still_joining(&self) -> bool;

    /// Runs the local `OnNewMember` hook. Logged, not fatal.
    async fn dispatch_on_new_member(&self, name: String);

    /// Runs the local `OnHeartbeat` hook. Called by the replicated database
    /// facade on each heartbeat tick it drives internally. Logged, not fatal.
    async fn dispatch_on_heartbeat(&self);

    /// Reloads the global tracing filter, if the embedder installed one via
    /// [`crate::logging::LogController::init`] and handed it to
    /// [`crate::orchestrator::OrchestratorConfig`]. A no-op `Ok(())` when no
    /// controller was configured.
    fn set_log_level(&self, level: &str) -> KernelResult<()>;
}

#[cfg(test)]
pub mod tests_support {
    //! Minimal `OrchestratorHandle` implementations for unit tests in
    //! sibling modules (`hooks`, `internal_api`) that need a handle but not
    //! a fully wired orchestrator.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use super::*;
    use crate::db::stub::InMemoryDatabase;

    /// Panics if any accessor or callable is actually invoked; use only
    /// where a hook never touches its state argument.
    pub struct NullHandle;

    #[async_trait]
    impl OrchestratorHandle for NullHandle {
        fn name(&self) -> String {
            "null".into()
        }
        fn address(&self) -> String {
            "0.0.0.0:0".into()
        }
        fn os_layout(&self) -> OsLayout {
            OsLayout::resolve(std::env::temp_dir()).expect("temp dir is always usable")
        }
        fn server_cert(&self) -> CertMaterial {
            unimplemented!("NullHandle carries no certificate")
        }
        fn cluster_cert(&self) -> Option<CertMaterial> {
            None
        }
        fn remotes(&self) -> Vec<Remote> {
            Vec::new()
        }
        fn extensions(&self) -> Vec<Extension> {
            Vec::new()
        }
        fn database(&self) -> Arc<dyn ReplicatedDatabase> {
            Arc::new(InMemoryDatabase::new())
        }
        async fn start_api(&self, _params: StartApiParams) -> KernelResult<()> {
            Ok(())
        }
        async fn reload_cluster_cert(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn stop_listeners(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn stop(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn remove_member(&self, _name: &str, _force: bool) -> KernelResult<()> {
            Ok(())
        }
        async fn add_trust_store_entry(&self, _remote: Remote) -> KernelResult<()> {
            Ok(())
        }
        fn record_upgrade_notification(&self, _dqlite_version: u64) {}
        fn is_still_joining(&self) -> bool {
            false
        }
        async fn dispatch_on_new_member(&self, _name: String) {}
        async fn dispatch_on_heartbeat(&self) {}
        fn set_log_level(&self, _level: &str) -> KernelResult<()> {
            Ok(())
        }
    }

    /// Records calls so `internal_api` handler tests can assert on them.
    #[derive(Default)]
    pub struct RecordingHandle {
        still_joining: AtomicBool,
        last_upgrade_version: AtomicU64,
        inserted: parking_lot::Mutex<Vec<Remote>>,
        new_member_calls: parking_lot::Mutex<Vec<String>>,
        removed: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingHandle {
        pub fn set_still_joining(&self, value: bool) {
            self.still_joining.store(value, Ordering::SeqCst);
        }

        pub fn inserted_remotes(&self) -> Vec<Remote> {
            self.inserted.lock().clone()
        }

        pub fn new_member_calls(&self) -> Vec<String> {
            self.new_member_calls.lock().clone()
        }

        pub fn last_upgrade_version(&self) -> u64 {
            self.last_upgrade_version.load(Ordering::SeqCst)
        }

        pub fn removed_members(&self) -> Vec<String> {
            self.removed.lock().clone()
        }
    }

    #[async_trait]
    impl OrchestratorHandle for RecordingHandle {
        fn name(&self) -> String {
            "recording".into()
        }
        fn address(&self) -> String {
            "0.0.0.0:0".into()
        }
        fn os_layout(&self) -> OsLayout {
            OsLayout::resolve(std::env::temp_dir()).expect("temp dir is always usable")
        }
        fn server_cert(&self) -> CertMaterial {
            unimplemented!("RecordingHandle carries no certificate")
        }
        fn cluster_cert(&self) -> Option<CertMaterial> {
            None
        }
        fn remotes(&self) -> Vec<Remote> {
            self.inserted.lock().clone()
        }
        fn extensions(&self) -> Vec<Extension> {
            Vec::new()
        }
        fn database(&self) -> Arc<dyn ReplicatedDatabase> {
            Arc::new(InMemoryDatabase::new())
        }
        async fn start_api(&self, _params: StartApiParams) -> KernelResult<()> {
            Ok(())
        }
        async fn reload_cluster_cert(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn stop_listeners(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn stop(&self) -> KernelResult<()> {
            Ok(())
        }
        async fn remove_member(&self, name: &str, _force: bool) -> KernelResult<()> {
            self.removed.lock().push(name.to_string());
            Ok(())
        }
        async fn add_trust_store_entry(&self, remote: Remote) -> KernelResult<()> {
            self.inserted.lock().push(remote);
            Ok(())
        }
        fn record_upgrade_notification(&self, dqlite_version: u64) {
            self.last_upgrade_version.store(dqlite_version, Ordering::SeqCst);
        }
        fn is_still_joining(&self) -> bool {
            self.still_joining.load(Ordering::SeqCst)
        }
        async fn dispatch_on_new_member(&self, name: String) {
            self.new_member_calls.lock().push(name);
        }
        async fn dispatch_on_heartbeat(&self) {}
        fn set_log_level(&self, _level: &str) -> KernelResult<()> {
            Ok(())
        }
    }
}
