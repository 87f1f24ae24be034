// tests/lifecycle.rs

//! End-to-end lifecycle scenarios against the public `Orchestrator` API,
//! using a small in-process `ReplicatedDatabase` fake (the crate's own
//! `#[cfg(test)]` stub isn't part of the public surface these tests link
//! against). Exercises bootstrap-to-ready, reload-on-restart, shutdown
//! exactly-once, and certificate rotation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clusterd_kernel::KernelResult;
use clusterd_kernel::db::{MemberRole, ReplicatedDatabase, SchemaUpdate, SchemaVersion, SelfMember};
use clusterd_kernel::hooks::HookSet;
use clusterd_kernel::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, StartApiParams};
use clusterd_kernel::trust::Remote;
use tokio_util::sync::CancellationToken;

/// A minimal `ReplicatedDatabase` for integration testing: records which
/// operations ran and how many times, without doing anything replicated.
#[derive(Default)]
struct FakeDatabase {
    bootstrap_calls: AtomicU32,
    join_calls: AtomicU32,
    reload_calls: AtomicU32,
    stop_calls: AtomicU32,
}

impl FakeDatabase {
    fn stop_call_count(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplicatedDatabase for FakeDatabase {
    async fn set_schema(&self, _updates: Vec<SchemaUpdate>, _extensions: Vec<String>) -> KernelResult<()> {
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
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
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
        self.join_calls.fetch_add(1, Ordering::SeqCst);
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
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn schema_version(&self) -> SchemaVersion {
        SchemaVersion {
            internal: 1,
            external: 1,
            api_extension: 0,
        }
    }

    async fn stop(&self) -> KernelResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn own_socket_group() -> String {
    unsafe { libc::getegid() }.to_string()
}

fn config(state_dir: std::path::PathBuf, db: Arc<FakeDatabase>) -> OrchestratorConfig {
    OrchestratorConfig {
        listen_port: Some(0),
        state_dir,
        socket_group: own_socket_group(),
        project: "integration-test".to_string(),
        schema: vec![SchemaUpdate {
            name: "v1".to_string(),
        }],
        extensions: Vec::new(),
        extension_servers: Vec::new(),
        hooks: HookSet::default(),
        db,
        log_controller: None,
    }
}

#[tokio::test]
async fn run_without_start_api_stays_unbootstrapped_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(FakeDatabase::default());
    let orchestrator = Orchestrator::new(config(dir.path().to_path_buf(), db.clone())).unwrap();
    let mut ready = orchestrator.ready();
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_task = tokio::spawn(async move { orchestrator.run(run_token).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(db.bootstrap_calls.load(Ordering::SeqCst), 0);
    assert!(ready.try_recv().is_err());
    assert!(!dir.path().join("daemon.yaml").exists());

    token.cancel();
    run_task.await.unwrap().unwrap();
    assert_eq!(db.stop_call_count(), 1);
}

#[tokio::test]
async fn bootstrap_then_restart_reloads_without_explicit_start_api() {
    let dir = tempfile::tempdir().unwrap();

    // --- First process: bootstrap. ---
    let db1 = Arc::new(FakeDatabase::default());
    let orchestrator1 = Orchestrator::new(config(dir.path().to_path_buf(), db1.clone())).unwrap();
    let mut ready1 = orchestrator1.ready();
    let token1 = CancellationToken::new();
    let run_token1 = token1.clone();

    let handle1 = orchestrator1.state();
    let run_task1 = tokio::spawn({
        let orchestrator1 = orchestrator1;
        async move { orchestrator1.run(run_token1).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle1
        .start_api(StartApiParams {
            bootstrap: true,
            ..Default::default()
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), ready1.recv())
        .await
        .expect("bootstrap never became ready")
        .unwrap();
    assert_eq!(db1.bootstrap_calls.load(Ordering::SeqCst), 1);
    assert!(dir.path().join("daemon.yaml").exists());

    token1.cancel();
    run_task1.await.unwrap().unwrap();
    assert_eq!(db1.stop_call_count(), 1);

    // --- Second process, same state directory: should auto-reload. ---
    let db2 = Arc::new(FakeDatabase::default());
    let orchestrator2 = Orchestrator::new(config(dir.path().to_path_buf(), db2.clone())).unwrap();
    let mut ready2 = orchestrator2.ready();
    let token2 = CancellationToken::new();
    let run_token2 = token2.clone();
    let run_task2 = tokio::spawn(async move { orchestrator2.run(run_token2).await });

    tokio::time::timeout(Duration::from_secs(5), ready2.recv())
        .await
        .expect("reload-on-restart never became ready")
        .unwrap();
    assert_eq!(db2.reload_calls.load(Ordering::SeqCst), 1);
    assert_eq!(db2.bootstrap_calls.load(Ordering::SeqCst), 0);
    assert_eq!(db2.join_calls.load(Ordering::SeqCst), 0);

    token2.cancel();
    run_task2.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_is_exactly_once_under_concurrent_callers() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(FakeDatabase::default());
    let orchestrator = Orchestrator::new(config(dir.path().to_path_buf(), db.clone())).unwrap();
    let handle = orchestrator.state();
    let mut ready = orchestrator.ready();
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_task = tokio::spawn(async move { orchestrator.run(run_token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
        .start_api(StartApiParams {
            bootstrap: true,
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), ready.recv())
        .await
        .unwrap()
        .unwrap();

    let h1 = handle.clone();
    let h2 = handle.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { h1.stop().await }),
        tokio::spawn(async move { h2.stop().await }),
    );
    r1.unwrap().unwrap();
    r2.unwrap().unwrap();
    assert_eq!(db.stop_call_count(), 1);

    // `stop()` alone must unblock `run` without the caller also cancelling
    // its own token — that is the whole point of the shutdown channel.
    tokio::time::timeout(Duration::from_secs(5), run_task)
        .await
        .expect("run() never returned after an internal stop() call")
        .unwrap()
        .unwrap();
    assert!(!token.is_cancelled());
}

#[tokio::test]
async fn removing_self_triggers_run_to_return_without_explicit_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(FakeDatabase::default());
    let orchestrator = Orchestrator::new(config(dir.path().to_path_buf(), db)).unwrap();
    let handle = orchestrator.state();
    let mut ready = orchestrator.ready();
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_task = tokio::spawn(async move { orchestrator.run(run_token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
        .start_api(StartApiParams {
            bootstrap: true,
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), ready.recv())
        .await
        .unwrap()
        .unwrap();

    let own_name = handle.name();
    handle.remove_member(&own_name, false).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), run_task)
        .await
        .expect("run() never returned after a self-removal")
        .unwrap()
        .unwrap();
    assert!(!token.is_cancelled());
    assert!(handle.remotes().iter().all(|r| r.name != own_name));
}

#[tokio::test]
async fn cluster_cert_reload_pushes_to_live_network_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(FakeDatabase::default());
    let orchestrator = Orchestrator::new(config(dir.path().to_path_buf(), db)).unwrap();
    let handle = orchestrator.state();
    let mut ready = orchestrator.ready();
    let token = CancellationToken::new();
    let run_token = token.clone();
    let run_task = tokio::spawn(async move { orchestrator.run(run_token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
        .start_api(StartApiParams {
            bootstrap: true,
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), ready.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(handle.cluster_cert().is_some());
    handle.reload_cluster_cert().await.unwrap();

    token.cancel();
    run_task.await.unwrap().unwrap();
}
