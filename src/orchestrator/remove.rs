// src/orchestrator/remove.rs

//! Member removal: `PreRemove` → trust-store removal → `PostRemove`. Driven
//! externally — an embedder's own REST handler calls
//! [`super::OrchestratorHandle::remove_member`] the way it calls `start_api`.
//!
//! Removing this node's own name is the graceful-stop case: once the hooks
//! and trust-store removal finish, it triggers the shutdown-requested signal
//! so `Orchestrator::run` returns on its own, matching "respond to caller,
//! then post to the channel, then `Run` returns".

use std::sync::Arc;

use tracing::info;

use super::{LiveHandle, OrchestratorInner};
use crate::error::{KernelError, KernelResult};

pub(super) async fn run_remove(
    inner: &Arc<OrchestratorInner>,
    name: &str,
    force: bool,
) -> KernelResult<()> {
    let handle = LiveHandle::new(inner.clone());

    inner
        .hooks
        .pre_remove(handle.clone(), force)
        .await
        .map_err(|e| KernelError::Hook(format!("PreRemove hook failed: {e}")))?;

    inner
        .trust_store()
        .remove(name)
        .map_err(|e| KernelError::Peer(format!("Failed to remove '{name}' from trust store: {e:#}")))?;

    inner
        .hooks
        .post_remove(handle, force)
        .await
        .map_err(|e| KernelError::Hook(format!("PostRemove hook failed: {e}")))?;

    info!("Removed member '{name}' from the trust store");

    if *inner.name.read() == name {
        inner.shutdown_requested.cancel();
    }
    Ok(())
}
