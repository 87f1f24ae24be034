// src/orchestrator/mod.rs

//! The root component. Owns the OS layout, watcher, trust store, certificate
//! holder, endpoint manager, and replicated database; executes the
//! bootstrap/join/reload state machine; dispatches hooks; synchronizes
//! shutdown.

mod bootstrap;
mod init;
mod join;
mod reload;
mod remove;
mod shutdown;
mod state_handle;

pub use state_handle::{NewConfig, OrchestratorHandle, StartApiParams};
#[cfg(test)]
pub use state_handle::tests_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cert::{CertHolder, CertMaterial};
use crate::db::{ReplicatedDatabase, SchemaUpdate};
use crate::error::{KernelError, KernelResult};
use crate::extension::{Extension, ExtensionServer};
use crate::hooks::HookSet;
use crate::logging::LogController;
use crate::os_layout::OsLayout;
use crate::trust::{Remote, TrustStore};
use crate::watcher::DirWatcher;
use shutdown::ShutdownLatch;

/// Where the node's startup state machine currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    ControlSocketOnly,
    NetworkListening,
    DatabaseReady,
    Ready,
}

/// Everything `Orchestrator::new` needs. `project` namespaces the replicated
/// database's own bookkeeping and isn't named explicitly in the public
/// contract's `Run` signature, but every database operation requires it, so
/// it travels with the rest of the fixed configuration (see DESIGN.md).
pub struct OrchestratorConfig {
    pub listen_port: Option<u16>,
    pub state_dir: PathBuf,
    pub socket_group: String,
    pub project: String,
    pub schema: Vec<SchemaUpdate>,
    pub extensions: Vec<Extension>,
    pub extension_servers: Vec<ExtensionServer>,
    pub hooks: HookSet,
    pub db: Arc<dyn ReplicatedDatabase>,
    /// The reload handle from [`crate::logging::LogController::init`], if the
    /// embedder wants `set_log_level` to reach a live `EnvFilter`.
    pub log_controller: Option<LogController>,
}

pub(crate) struct OrchestratorInner {
    pub(crate) name: RwLock<String>,
    pub(crate) address: RwLock<String>,
    pub(crate) listen_port: Option<u16>,
    pub(crate) layout: OsLayout,
    pub(crate) socket_group: String,
    pub(crate) project: String,
    /// Populated by `init::run_init` before anything else touches it. Every
    /// accessor past that point is entitled to assume it is present and
    /// panics with an "invariant violation" message rather than returning a
    /// misleading default if it isn't.
    pub(crate) cert_holder: OnceCell<CertHolder>,
    pub(crate) trust_store: OnceCell<TrustStore>,
    pub(crate) endpoints: crate::endpoint::EndpointManager,
    pub(crate) watcher: Mutex<Option<DirWatcher>>,
    pub(crate) db: Arc<dyn ReplicatedDatabase>,
    /// Taken by `init::run_init` on its first (and only) call to `SetSchema`.
    pub(crate) schema: Mutex<Option<Vec<SchemaUpdate>>>,
    pub(crate) hooks: HookSet,
    pub(crate) log_controller: Option<LogController>,
    pub(crate) extensions: Vec<Extension>,
    pub(crate) extension_servers: Mutex<Vec<ExtensionServer>>,
    pub(crate) state: RwLock<LifecycleState>,
    pub(crate) still_joining: AtomicBool,
    pub(crate) last_dqlite_version: AtomicU64,
    pub(crate) ready_tx: broadcast::Sender<()>,
    pub(crate) shutdown: ShutdownLatch,
    /// Cancelled the instant any caller requests shutdown — internally (a
    /// handler driving the shutdown channel, e.g. a remove/graceful-stop
    /// request) or via [`OrchestratorHandle::stop`]. `Orchestrator::run`
    /// selects on this alongside the caller's own cancellation token so an
    /// internally-triggered stop makes `run` return on its own, without
    /// requiring the caller to also cancel their token.
    pub(crate) shutdown_requested: CancellationToken,
    pub(crate) start_api_called: AtomicBool,
}

/// The daemon's lifecycle root. Construct once per process with
/// [`Orchestrator::new`]; drive it with [`Orchestrator::run`].
pub struct Orchestrator {
    pub(crate) inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    /// Resolves the state directory and binds nothing yet — actual I/O
    /// happens in [`Orchestrator::run`]'s `init` step.
    pub fn new(config: OrchestratorConfig) -> KernelResult<Self> {
        let layout = OsLayout::resolve(config.state_dir)
            .map_err(|e| KernelError::Config(format!("{e:#}")))?;
        let name = hostname_or_unknown();

        let inner = OrchestratorInner {
            name: RwLock::new(name),
            address: RwLock::new(String::new()),
            listen_port: config.listen_port,
            layout,
            socket_group: config.socket_group,
            project: config.project,
            cert_holder: OnceCell::new(),
            trust_store: OnceCell::new(),
            endpoints: crate::endpoint::EndpointManager::new(),
            watcher: Mutex::new(None),
            db: config.db,
            schema: Mutex::new(Some(config.schema)),
            hooks: config.hooks,
            log_controller: config.log_controller,
            extensions: config.extensions,
            extension_servers: Mutex::new(config.extension_servers),
            state: RwLock::new(LifecycleState::Unconfigured),
            still_joining: AtomicBool::new(false),
            last_dqlite_version: AtomicU64::new(0),
            ready_tx: broadcast::channel(1).0,
            shutdown: ShutdownLatch::new(),
            shutdown_requested: CancellationToken::new(),
            start_api_called: AtomicBool::new(false),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Blocks until `cancellation` is triggered, an internal caller requests
    /// shutdown (e.g. a remove/graceful-stop request handler calling
    /// [`OrchestratorHandle::stop`]), or an internal fatal error occurs;
    /// always runs the shutdown sequence before returning.
    pub async fn run(&self, cancellation: CancellationToken) -> KernelResult<()> {
        let init_result = init::run_init(&self.inner).await;
        if let Err(e) = init_result {
            return Err(e);
        }

        tokio::select! {
            _ = cancellation.cancelled() => {}
            _ = self.inner.shutdown_requested.cancelled() => {}
        }
        self.inner.run_shutdown().await
    }

    /// Produces a handle exposing the node's current live dependencies.
    /// Accessors on the returned handle are live, not a snapshot.
    pub fn state(&self) -> Arc<dyn OrchestratorHandle> {
        LiveHandle::new(self.inner.clone())
    }

    /// Equivalent to the public contract's `StartAPI`. Exposed directly so
    /// callers that already hold an `Orchestrator` (rather than a handle)
    /// don't need to go through `state()` first.
    pub async fn start_api(&self, params: StartApiParams) -> KernelResult<()> {
        dispatch_start_api(&self.inner, params).await
    }

    pub fn ready(&self) -> broadcast::Receiver<()> {
        self.inner.ready_tx.subscribe()
    }
}

/// Transitions `ControlSocketOnly → NetworkListening → DatabaseReady` via
/// either the bootstrap or join path. Exactly one successful call per
/// process lifetime; the automatic reload-on-startup path
/// ([`reload::run_reload`]) bypasses this counter entirely.
pub(crate) async fn dispatch_start_api(
    inner: &Arc<OrchestratorInner>,
    params: StartApiParams,
) -> KernelResult<()> {
    if inner.start_api_called.swap(true, std::sync::atomic::Ordering::SeqCst) {
        return Err(KernelError::InvalidState(
            "StartAPI already called for this node".into(),
        ));
    }
    if let Some(new_config) = &params.new_config {
        if let Some(name) = &new_config.name {
            *inner.name.write() = name.clone();
        }
        if let Some(address) = &new_config.address {
            *inner.address.write() = address.clone();
        }
    }
    if params.bootstrap {
        bootstrap::run_bootstrap(inner, params.init_config).await
    } else {
        join::run_join(inner, params.init_config, params.join_addresses).await
    }
}

/// Binds (or swaps TLS on) the core network listener at `address` with
/// `cert`, mounting the internal API, the public root, and every extension
/// server whose address is empty or equal to `address` — see the
/// string-equality address-matching rule in DESIGN.md. Extension servers
/// with a distinct address get their own listener.
pub(crate) async fn bind_network_endpoints(
    inner: &Arc<OrchestratorInner>,
    address: &str,
    cert: &crate::cert::CertMaterial,
) -> KernelResult<()> {
    let handle = LiveHandle::new(inner.clone());
    let (core_extras, distinct): (Vec<_>, Vec<(String, crate::cert::CertMaterial, axum::Router)>) = {
        let servers = inner.extension_servers.lock();
        let mut core_extras = Vec::new();
        let mut distinct = Vec::new();
        for server in servers.iter() {
            if crate::endpoint::address_matches_core(server.address.as_deref(), address) {
                core_extras.push(server.resource_group.clone());
            } else if let Some(addr) = &server.address {
                let server_cert = server.certificate.clone().unwrap_or_else(|| cert.clone());
                distinct.push((addr.clone(), server_cert, server.resource_group.clone()));
            }
        }
        (core_extras, distinct)
    };

    let mut core_router = crate::endpoint::base_router().merge(crate::internal_api::internal_router(handle));
    for extra in core_extras {
        core_router = core_router.merge(extra);
    }

    if inner.endpoints.network_addresses().contains(&address.to_string()) {
        inner
            .endpoints
            .update_tls(cert)
            .await
            .map_err(|e| KernelError::Endpoint(format!("{e:#}")))?;
    } else {
        inner
            .endpoints
            .add_network(address, cert, core_router)
            .await
            .map_err(|e| KernelError::Endpoint(format!("{e:#}")))?;
    }

    for (addr, server_cert, router) in distinct {
        inner
            .endpoints
            .add_network(&addr, &server_cert, router)
            .await
            .map_err(|e| KernelError::Endpoint(format!("{e:#}")))?;
    }

    *inner.state.write() = LifecycleState::NetworkListening;
    Ok(())
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

impl OrchestratorInner {
    pub(crate) fn cert_holder(&self) -> &CertHolder {
        self.cert_holder
            .get()
            .expect("Invariant violation: certificate holder read before init completed")
    }

    pub(crate) fn trust_store(&self) -> &TrustStore {
        self.trust_store
            .get()
            .expect("Invariant violation: trust store read before init completed")
    }
}

/// The concrete `OrchestratorHandle`: a thin wrapper over `Arc<OrchestratorInner>`
/// with no reverse reference, so nothing the orchestrator owns ever holds a
/// strong cycle back to itself.
pub(crate) struct LiveHandle {
    inner: Arc<OrchestratorInner>,
}

impl LiveHandle {
    pub(crate) fn new(inner: Arc<OrchestratorInner>) -> Arc<dyn OrchestratorHandle> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl OrchestratorHandle for LiveHandle {
    fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    fn address(&self) -> String {
        self.inner.address.read().clone()
    }

    fn os_layout(&self) -> OsLayout {
        self.inner.layout.clone()
    }

    fn server_cert(&self) -> CertMaterial {
        self.inner.cert_holder().server_cert()
    }

    fn cluster_cert(&self) -> Option<CertMaterial> {
        self.inner.cert_holder().cluster_cert()
    }

    fn remotes(&self) -> Vec<Remote> {
        self.inner.trust_store().remotes()
    }

    fn extensions(&self) -> Vec<Extension> {
        self.inner.extensions.clone()
    }

    fn database(&self) -> Arc<dyn ReplicatedDatabase> {
        self.inner.db.clone()
    }

    async fn start_api(&self, params: StartApiParams) -> KernelResult<()> {
        dispatch_start_api(&self.inner, params).await
    }

    async fn reload_cluster_cert(&self) -> KernelResult<()> {
        self.inner.reload_cluster_cert().await
    }

    async fn stop_listeners(&self) -> KernelResult<()> {
        self.inner.endpoints.down(None).await;
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        self.inner.run_shutdown().await
    }

    async fn remove_member(&self, name: &str, force: bool) -> KernelResult<()> {
        remove::run_remove(&self.inner, name, force).await
    }

    async fn add_trust_store_entry(&self, remote: Remote) -> KernelResult<()> {
        self.inner
            .trust_store()
            .add(remote)
            .map_err(|e| KernelError::Peer(format!("{e:#}")))
    }

    fn record_upgrade_notification(&self, dqlite_version: u64) {
        self.inner
            .last_dqlite_version
            .store(dqlite_version, std::sync::atomic::Ordering::SeqCst);
        info!("Recorded upgrade notification for dqlite version {dqlite_version}");
    }

    fn is_still_joining(&self) -> bool {
        self.inner
            .still_joining
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn dispatch_on_new_member(&self, name: String) {
        let handle = LiveHandle::new(self.inner.clone());
        self.inner.hooks.on_new_member(handle, name).await;
    }

    async fn dispatch_on_heartbeat(&self) {
        let handle = LiveHandle::new(self.inner.clone());
        self.inner.hooks.on_heartbeat(handle).await;
    }

    fn set_log_level(&self, level: &str) -> KernelResult<()> {
        match &self.inner.log_controller {
            Some(controller) => controller
                .set_level(level)
                .map_err(|e| KernelError::Internal(format!("{e:#}"))),
            None => Ok(()),
        }
    }
}
