// src/orchestrator/shutdown.rs

//! The exactly-once shutdown latch: stop the database (capturing its error
//! but continuing), bring every endpoint down, return the first non-nil
//! error, preferring the database's.

use tokio::sync::OnceCell;
use tracing::{error, warn};

use super::OrchestratorInner;
use crate::error::KernelResult;

/// Concurrent callers of [`OrchestratorInner::run_shutdown`] all observe the
/// same result — the first caller runs the sequence, everyone else awaits
/// its cached outcome.
pub(crate) struct ShutdownLatch {
    cell: OnceCell<KernelResult<()>>,
}

impl ShutdownLatch {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl OrchestratorInner {
    /// Triggers the shutdown-requested signal immediately (so a concurrently
    /// running `Orchestrator::run` wakes up and calls this itself), then runs
    /// or awaits the one-time shutdown sequence.
    pub(crate) async fn run_shutdown(&self) -> KernelResult<()> {
        self.shutdown_requested.cancel();
        self.shutdown
            .cell
            .get_or_init(|| async { self.shutdown_sequence().await })
            .await
            .clone()
    }

    async fn shutdown_sequence(&self) -> KernelResult<()> {
        let db_result = self.db.stop().await;
        if let Err(e) = &db_result {
            error!("Database stop failed during shutdown: {e}");
        }

        self.endpoints.down(None).await;

        if let Some(watcher) = self.watcher.lock().take() {
            drop(watcher);
        }

        match db_result {
            Err(e) => Err(e),
            Ok(()) => {
                warn!("Shutdown sequence complete");
                Ok(())
            }
        }
    }
}
