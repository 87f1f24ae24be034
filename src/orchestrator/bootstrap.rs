// src/orchestrator/bootstrap.rs

//! The bootstrap path: `PreBootstrap` → generate cluster cert → bind/swap
//! network TLS → `db.Bootstrap` → refresh trust store → `PostBootstrap`.

use std::sync::Arc;

use tracing::{info, warn};

use super::{LifecycleState, LiveHandle, OrchestratorInner, bind_network_endpoints};
use crate::config::PersistedConfig;
use crate::db::{MemberRole, SelfMember};
use crate::error::{KernelError, KernelResult};
use crate::hooks::InitConfig;
use crate::reverter::Reverter;
use crate::trust::Remote;

pub(super) async fn run_bootstrap(
    inner: &Arc<OrchestratorInner>,
    init_config: InitConfig,
) -> KernelResult<()> {
    let handle = LiveHandle::new(inner.clone());
    inner
        .hooks
        .pre_bootstrap(handle.clone(), init_config.clone())
        .await
        .map_err(|e| KernelError::Hook(format!("PreBootstrap hook failed: {e}")))?;

    let port = inner
        .listen_port
        .ok_or_else(|| KernelError::Config("listen port is required to bootstrap".into()))?;
    let address = format!("0.0.0.0:{port}");
    *inner.address.write() = address.clone();
    let name = inner.name.read().clone();

    // Everything from here through `daemon.yaml` being persisted is one
    // atomic unit: if any step fails, the self trust-store entry must not
    // survive to the next process start with no corresponding `daemon.yaml`
    // (`OsLayout::is_bootstrapped_on_disk` doesn't look at the trust store,
    // so a half-written self-entry would otherwise be invisible to it).
    let mut reverter = Reverter::new();

    let server_cert = inner.cert_holder().server_cert();
    let self_remote = Remote {
        name: name.clone(),
        address: address.clone(),
        certificate: server_cert.chain[0].as_ref().to_vec(),
    };
    inner
        .trust_store()
        .add(self_remote)
        .map_err(|e| KernelError::Config(format!("Failed to record self in trust store: {e:#}")))?;
    {
        let inner = inner.clone();
        let name = name.clone();
        reverter.on_rollback(move || {
            if let Err(e) = inner.trust_store().remove(&name) {
                warn!("Failed to roll back self trust-store entry after a failed bootstrap: {e:#}");
            }
        });
    }

    let cluster_cert = inner
        .cert_holder()
        .generate_cluster_cert(
            &inner.project,
            &inner.layout.cluster_cert_path(),
            &inner.layout.cluster_key_path(),
        )
        .map_err(|e| KernelError::Config(format!("Failed to generate cluster certificate: {e:#}")))?;

    bind_network_endpoints(inner, &address, &cluster_cert).await?;

    let extension_names: Vec<String> = inner
        .extensions
        .iter()
        .map(|e| e.as_str().to_string())
        .collect();
    inner
        .db
        .bootstrap(
            &extension_names,
            &inner.project,
            &address,
            SelfMember {
                name: name.clone(),
                address: address.clone(),
                role: MemberRole::Pending,
            },
            handle.clone(),
        )
        .await
        .map_err(|e| KernelError::Database(format!("Failed to bootstrap database: {e}")))?;

    inner
        .trust_store()
        .refresh()
        .map_err(|e| KernelError::Config(format!("Failed to refresh trust store: {e:#}")))?;

    PersistedConfig { name, address }
        .save(inner.layout.root())
        .map_err(|e| KernelError::Config(format!("Failed to persist daemon.yaml: {e:#}")))?;

    // Both on-disk markers are now present; a `PostBootstrap` failure past
    // this point is not rolled back, matching §5's cancellation policy.
    reverter.success();

    inner
        .hooks
        .post_bootstrap(handle, init_config)
        .await
        .map_err(|e| KernelError::Hook(format!("PostBootstrap hook failed: {e}")))?;

    *inner.state.write() = LifecycleState::DatabaseReady;
    info!("Bootstrap complete");

    inner.finish_to_ready().await
}
