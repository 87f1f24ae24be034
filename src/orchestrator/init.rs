// src/orchestrator/init.rs

//! `Unconfigured → ControlSocketOnly`, with the scoped-rollback discipline
//! from §9: register a cleanup action as each resource is acquired, call
//! `success()` only once every step below has completed. A failure anywhere
//! in this function leaves the state directory as it was before `Run` was
//! called, modulo the one-time creation of the directory itself.

use std::sync::Arc;

use tracing::info;

use super::{LifecycleState, OrchestratorInner};
use crate::cert::CertHolder;
use crate::config::PersistedConfig;
use crate::error::{KernelError, KernelResult};
use crate::extension::validate_resource_paths;
use crate::reverter::Reverter;
use crate::trust::TrustStore;
use crate::watcher::DirWatcher;

pub(super) async fn run_init(inner: &Arc<OrchestratorInner>) -> KernelResult<()> {
    let mut reverter = Reverter::new();

    let node_name = inner.name.read().clone();
    let cert_holder = CertHolder::load_or_generate_server_cert(
        &node_name,
        &inner.layout.server_cert_path(),
        &inner.layout.server_key_path(),
    )
    .map_err(|e| KernelError::Config(format!("Failed to load server certificate: {e:#}")))?;
    inner
        .cert_holder
        .set(cert_holder)
        .map_err(|_| KernelError::InvalidState("init ran more than once".into()))?;

    let trust_dir = inner.layout.trust_dir();
    let trust_store = TrustStore::open(trust_dir.clone())
        .map_err(|e| KernelError::Config(format!("Failed to open trust store: {e:#}")))?;
    inner
        .trust_store
        .set(trust_store)
        .map_err(|_| KernelError::InvalidState("init ran more than once".into()))?;

    let watcher = DirWatcher::start(&trust_dir)
        .map_err(|e| KernelError::Config(format!("Failed to start trust-store watcher: {e:#}")))?;
    *inner.watcher.lock() = Some(watcher);
    {
        let inner = inner.clone();
        reverter.on_rollback(move || {
            *inner.watcher.lock() = None;
        });
    }

    let schema = inner.schema.lock().take().unwrap_or_default();
    let extension_names: Vec<String> = inner
        .extensions
        .iter()
        .map(|e| e.as_str().to_string())
        .collect();
    inner
        .db
        .set_schema(schema, extension_names)
        .await
        .map_err(|e| KernelError::Database(format!("Failed to register schema: {e}")))?;

    validate_resource_paths(&inner.extension_servers.lock())
        .map_err(|e| KernelError::Config(format!("{e:#}")))?;

    let control_router = crate::endpoint::base_router();
    inner
        .endpoints
        .add_control_socket(&inner.layout, &inner.socket_group, control_router)
        .map_err(|e| KernelError::Endpoint(format!("Failed to bind control socket: {e:#}")))?;
    {
        let inner = inner.clone();
        reverter.on_rollback(move || {
            let inner = inner.clone();
            tokio::spawn(async move {
                inner.endpoints.down(Some(crate::endpoint::EndpointKind::ControlSocket)).await;
            });
        });
    }

    let any_pre_init_extension = inner
        .extension_servers
        .lock()
        .iter()
        .any(|s| s.flags.pre_init);
    if let Some(port) = inner.listen_port {
        if any_pre_init_extension {
            let bind_address = format!("0.0.0.0:{port}");
            let server_cert = inner.cert_holder().server_cert();
            let network_router = crate::endpoint::base_router();
            inner
                .endpoints
                .add_network(&bind_address, &server_cert, network_router)
                .await
                .map_err(|e| {
                    KernelError::Endpoint(format!("Failed to bind pre-init network listener: {e:#}"))
                })?;
            *inner.address.write() = bind_address;
        }
    }

    *inner.state.write() = LifecycleState::ControlSocketOnly;
    info!("Control socket ready; node entered ControlSocketOnly");

    if inner.layout.is_bootstrapped_on_disk() {
        let persisted = PersistedConfig::load(inner.layout.root())
            .map_err(|e| KernelError::Config(format!("Failed to read daemon.yaml: {e:#}")))?
            .ok_or_else(|| {
                KernelError::Config("daemon.yaml reported present but failed to load".into())
            })?;
        *inner.name.write() = persisted.name;
        *inner.address.write() = persisted.address;
        super::reload::run_reload(inner).await?;
    }

    reverter.success();
    Ok(())
}
