// src/orchestrator/reload.rs

//! The reload-if-bootstrapped path (`DatabaseReady` reached via
//! `StartWithCluster` rather than `Bootstrap`/`Join`), and cluster
//! certificate hot reload.

use std::sync::Arc;

use tracing::info;

use super::{LifecycleState, OrchestratorInner};
use crate::error::{KernelError, KernelResult};

/// Rejoins an existing quorum using the addresses already recorded on disk.
/// Invoked from `init::run_init` when both on-disk markers are present;
/// intentionally does not go through the `StartAPI`-exactly-once counter —
/// the public contract treats this as a separate internal path.
pub(super) async fn run_reload(inner: &Arc<OrchestratorInner>) -> KernelResult<()> {
    let handle = super::LiveHandle::new(inner.clone());
    let remotes = inner.trust_store().remotes();
    let extension_names: Vec<String> = inner
        .extensions
        .iter()
        .map(|e| e.as_str().to_string())
        .collect();
    let address = inner.address.read().clone();
    let project = inner.project.clone();

    inner
        .db
        .start_with_cluster(&extension_names, &project, &address, &remotes, handle)
        .await
        .map_err(|e| KernelError::Database(format!("Failed to rejoin cluster: {e}")))?;

    *inner.state.write() = LifecycleState::DatabaseReady;
    info!("Rejoined existing quorum from on-disk state");

    inner.finish_to_ready().await
}

impl OrchestratorInner {
    /// `DatabaseReady → Ready`: run `OnStart`, then mark the node ready.
    /// Shared by the bootstrap, join, and reload paths — each reaches
    /// `DatabaseReady` differently but converges here.
    pub(crate) async fn finish_to_ready(self: &Arc<Self>) -> KernelResult<()> {
        let handle: Arc<dyn super::OrchestratorHandle> = super::LiveHandle::new(self.clone());
        self.hooks
            .on_start(handle)
            .await
            .map_err(|e| KernelError::Hook(format!("OnStart hook failed: {e}")))?;
        *self.state.write() = LifecycleState::Ready;
        let _ = self.ready_tx.send(());
        info!("Node is Ready");
        Ok(())
    }

    /// Reloads the cluster certificate from disk and pushes it to every live
    /// network endpoint, per §4.4: swap under the write lock, then
    /// `Endpoints.UpdateTLS`.
    pub(crate) async fn reload_cluster_cert(&self) -> KernelResult<()> {
        let material = self
            .cert_holder()
            .reload_cluster_cert(&self.layout.cluster_cert_path(), &self.layout.cluster_key_path())
            .map_err(|e| KernelError::Config(format!("{e:#}")))?;
        self.endpoints
            .update_tls(&material)
            .await
            .map_err(|e| KernelError::Endpoint(format!("Failed to push reloaded cert: {e:#}")))
    }
}
