// src/watcher.rs

//! Emits add/remove change events for a watched directory.
//!
//! The trust store subscribes to this; every other observer re-queries the
//! trust store on each request rather than being pushed updates, per the
//! kernel's "no push-to-handlers required" contract.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A single filesystem change relevant to the trust store.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Added(PathBuf),
    Removed(PathBuf),
    Other,
}

/// Wraps a `notify` watcher and republishes its events on a broadcast channel
/// so multiple observers (today: just the trust store) can subscribe.
pub struct DirWatcher {
    _inner: RecommendedWatcher,
    tx: broadcast::Sender<ChangeEvent>,
}

impl DirWatcher {
    pub fn start(dir: &Path) -> Result<Self> {
        let (tx, _rx) = broadcast::channel(256);
        let event_tx = tx.clone();

        let mut inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for change in classify(event) {
                        // A lagging/closed receiver is not fatal; events are
                        // re-derivable by rescanning the directory.
                        let _ = event_tx.send(change);
                    }
                }
                Err(e) => warn!("Filesystem watcher error: {}", e),
            }
        })
        .context("Failed to construct filesystem watcher")?;

        inner
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory '{}'", dir.display()))?;

        debug!("Watching {} for changes", dir.display());
        Ok(Self { _inner: inner, tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

fn classify(event: Event) -> Vec<ChangeEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(ChangeEvent::Added).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(ChangeEvent::Removed).collect(),
        EventKind::Modify(_) => event.paths.into_iter().map(ChangeEvent::Added).collect(),
        _ => vec![ChangeEvent::Other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn observes_file_creation_in_watched_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirWatcher::start(dir.path()).unwrap();
        let mut rx = watcher.subscribe();

        let file_path = dir.path().join("alpha.crt");
        std::fs::write(&file_path, b"cert").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for fs event")
            .expect("channel closed");
        match event {
            ChangeEvent::Added(p) => assert_eq!(p, file_path),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
