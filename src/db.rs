// src/db.rs

//! The replicated database facade. Opaque from the kernel's perspective: it
//! exposes exactly the operations the orchestrator needs to drive bootstrap,
//! join, rejoin, and teardown, plus a schema version query. Everything about
//! how replication actually happens is the embedder's concern.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::KernelResult;
use crate::orchestrator::OrchestratorHandle;
use crate::trust::Remote;

/// One ordered schema migration. Opaque payload; the kernel never inspects
/// it beyond passing it through to [`ReplicatedDatabase::set_schema`].
#[derive(Debug, Clone)]
pub struct SchemaUpdate {
    pub name: String,
}

/// The role the database assigns a member. These are transient and surfaced
/// by the database, not owned by the kernel — bootstrap always starts a
/// member as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Pending,
    Spare,
    Standby,
    Voter,
    Leader,
}

/// The self-member record passed to [`ReplicatedDatabase::bootstrap`].
#[derive(Debug, Clone)]
pub struct SelfMember {
    pub name: String,
    pub address: String,
    pub role: MemberRole,
}

/// `(internalVersion, externalVersion, apiExtensionVersion)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaVersion {
    pub internal: u64,
    pub external: u64,
    pub api_extension: u64,
}

/// The operations the kernel requires from the replicated database. The
/// kernel drives this; the database never calls back into the kernel except
/// via the `OnHeartbeat` hook, which is outside this trait's surface.
#[async_trait]
pub trait ReplicatedDatabase: Send + Sync {
    /// Registers the ordered schema-update list and extension identifiers.
    /// Must be called before any of `bootstrap`/`join`/`start_with_cluster`.
    async fn set_schema(&self, updates: Vec<SchemaUpdate>, extensions: Vec<String>)
    -> KernelResult<()>;

    /// Creates a single-member quorum and promotes `self_member` on success.
    /// Precondition: the trust store contains only self, and
    /// `self_member.role == MemberRole::Pending`. `state` is retained by
    /// implementations that drive their own heartbeat ticker, so they can
    /// call [`OrchestratorHandle::dispatch_on_heartbeat`] on each tick.
    async fn bootstrap(
        &self,
        extensions: &[String],
        project: &str,
        address: &str,
        self_member: SelfMember,
        state: Arc<dyn OrchestratorHandle>,
    ) -> KernelResult<()>;

    /// Adds self to an existing quorum as `Pending`, promoted per cluster
    /// policy. Precondition: the cluster cert matches existing members and
    /// trust confirmation has completed.
    async fn join(
        &self,
        extensions: &[String],
        project: &str,
        address: &str,
        join_addresses: &[String],
        state: Arc<dyn OrchestratorHandle>,
    ) -> KernelResult<()>;

    /// Rejoins an existing quorum using the addresses already on disk.
    /// Precondition: a prior bootstrap or join left its mark on disk.
    async fn start_with_cluster(
        &self,
        extensions: &[String],
        project: &str,
        address: &str,
        remotes: &[Remote],
        state: Arc<dyn OrchestratorHandle>,
    ) -> KernelResult<()>;

    /// Schema versions, valid only after `set_schema` has run.
    fn schema_version(&self) -> SchemaVersion;

    /// Flushes and terminates replication. Safe to call from any state.
    async fn stop(&self) -> KernelResult<()>;
}

#[cfg(test)]
pub mod stub {
    //! An in-memory stand-in used by the kernel's own tests. Not exported
    //! outside `#[cfg(test)]`: embedders supply their own implementation.

    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct InMemoryDatabase {
        schema_set: AtomicBool,
        bootstrapped: AtomicBool,
        joined: AtomicBool,
        stopped: AtomicBool,
        stop_calls: AtomicU32,
        version: SchemaVersion,
    }

    impl InMemoryDatabase {
        pub fn new() -> Self {
            Self {
                version: SchemaVersion {
                    internal: 1,
                    external: 1,
                    api_extension: 0,
                },
                ..Default::default()
            }
        }

        pub fn stop_call_count(&self) -> u32 {
            self.stop_calls.load(Ordering::SeqCst)
        }

        pub fn is_bootstrapped(&self) -> bool {
            self.bootstrapped.load(Ordering::SeqCst)
        }

        pub fn is_joined(&self) -> bool {
            self.joined.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReplicatedDatabase for InMemoryDatabase {
        async fn set_schema(
            &self,
            _updates: Vec<SchemaUpdate>,
            _extensions: Vec<String>,
        ) -> KernelResult<()> {
            self.schema_set.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn bootstrap(
            &self,
            _extensions: &[String],
            _project: &str,
            _address: &str,
            self_member: SelfMember,
            _state: Arc<dyn OrchestratorHandle>,
        ) -> KernelResult<()> {
            assert_eq!(self_member.role, MemberRole::Pending);
            self.bootstrapped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn join(
            &self,
            _extensions: &[String],
            _project: &str,
            _address: &str,
            _join_addresses: &[String],
            _state: Arc<dyn OrchestratorHandle>,
        ) -> KernelResult<()> {
            self.joined.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn start_with_cluster(
            &self,
            _extensions: &[String],
            _project: &str,
            _address: &str,
            _remotes: &[Remote],
            _state: Arc<dyn OrchestratorHandle>,
        ) -> KernelResult<()> {
            self.bootstrapped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn schema_version(&self) -> SchemaVersion {
            self.version
        }

        async fn stop(&self) -> KernelResult<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_but_counted() {
        let db = InMemoryDatabase::new();
        db.stop().await.unwrap();
        db.stop().await.unwrap();
        assert_eq!(db.stop_call_count(), 2);
    }

    #[tokio::test]
    async fn bootstrap_retains_the_handle_a_real_implementation_would_tick_heartbeats_on() {
        use crate::orchestrator::tests_support::NullHandle;

        let db = InMemoryDatabase::new();
        let handle: Arc<dyn OrchestratorHandle> = Arc::new(NullHandle);
        db.bootstrap(
            &[],
            "proj",
            "0.0.0.0:7000",
            SelfMember {
                name: "alpha".into(),
                address: "0.0.0.0:7000".into(),
                role: MemberRole::Pending,
            },
            handle.clone(),
        )
        .await
        .unwrap();
        assert!(db.is_bootstrapped());
        handle.dispatch_on_heartbeat().await;
    }
}
