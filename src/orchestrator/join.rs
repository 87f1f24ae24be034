// src/orchestrator/join.rs

//! The join path: bind/swap network TLS → `db.Join` → trust-confirmation
//! sub-protocol → `PreJoin` → upgrade-notification broadcast →
//! `OnNewMember` broadcast → `PostJoin`. See §4.6.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use tracing::{info, warn};

use super::{LifecycleState, LiveHandle, OrchestratorInner, bind_network_endpoints};
use crate::config::PersistedConfig;
use crate::error::{KernelError, KernelResult};
use crate::hooks::InitConfig;
use crate::trust::ClusterClientSet;

pub(super) async fn run_join(
    inner: &Arc<OrchestratorInner>,
    init_config: InitConfig,
    join_addresses: Vec<String>,
) -> KernelResult<()> {
    inner.still_joining.store(true, Ordering::SeqCst);
    let result = run_join_inner(inner, init_config, join_addresses).await;
    inner.still_joining.store(false, Ordering::SeqCst);
    result
}

async fn run_join_inner(
    inner: &Arc<OrchestratorInner>,
    init_config: InitConfig,
    join_addresses: Vec<String>,
) -> KernelResult<()> {
    let handle = LiveHandle::new(inner.clone());
    let name = inner.name.read().clone();
    let port = inner
        .listen_port
        .ok_or_else(|| KernelError::Config("listen port is required to join".into()))?;
    let address = format!("0.0.0.0:{port}");
    *inner.address.write() = address.clone();

    let cluster_cert = inner
        .cert_holder()
        .reload_cluster_cert(&inner.layout.cluster_cert_path(), &inner.layout.cluster_key_path())
        .map_err(|e| {
            KernelError::Config(format!(
                "Cluster certificate must be provisioned before joining: {e:#}"
            ))
        })?;

    bind_network_endpoints(inner, &address, &cluster_cert).await?;

    let extension_names: Vec<String> = inner
        .extensions
        .iter()
        .map(|e| e.as_str().to_string())
        .collect();
    inner
        .db
        .join(
            &extension_names,
            &inner.project,
            &address,
            &join_addresses,
            handle.clone(),
        )
        .await
        .map_err(|e| KernelError::Database(format!("Failed to join database: {e}")))?;

    inner
        .trust_store()
        .refresh()
        .map_err(|e| KernelError::Config(format!("Failed to refresh trust store: {e:#}")))?;

    let server_cert = inner.cert_holder().server_cert();
    let clients = inner
        .trust_store()
        .cluster(&name, false, &server_cert, &cluster_cert.cert_pem)
        .map_err(|e| KernelError::Peer(format!("Failed to build cluster client set: {e:#}")))?;

    confirm_trust(&clients, &name, &address, &server_cert.chain[0]).await?;

    inner
        .hooks
        .pre_join(handle.clone(), init_config.clone())
        .await
        .map_err(|e| KernelError::Hook(format!("PreJoin hook failed: {e}")))?;

    broadcast_upgrade_notification(&clients, inner.db.schema_version().internal).await;
    broadcast_new_member(&clients, &name).await?;

    PersistedConfig {
        name: name.clone(),
        address,
    }
    .save(inner.layout.root())
    .map_err(|e| KernelError::Config(format!("Failed to persist daemon.yaml: {e:#}")))?;

    inner
        .hooks
        .post_join(handle, init_config)
        .await
        .map_err(|e| KernelError::Hook(format!("PostJoin hook failed: {e}")))?;

    *inner.state.write() = LifecycleState::DatabaseReady;
    info!("Join complete");

    inner.finish_to_ready().await
}

/// Iterates peers, sending `AddTrustStoreEntry` to each until one succeeds.
/// All-fail is fatal.
async fn confirm_trust(
    clients: &ClusterClientSet,
    name: &str,
    address: &str,
    certificate: &rustls_pki_types::CertificateDer<'static>,
) -> KernelResult<()> {
    let body = json!({
        "name": name,
        "address": address,
        "certificate": certificate.as_ref(),
    });

    let attempted = clients.len();
    let mut last_error = String::from("no peers available");
    for client in clients.clients() {
        let url = client.url("/1.0/internal/cluster");
        match client.http().post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Trust confirmed by peer '{}'", client.name);
                return Ok(());
            }
            Ok(response) => {
                last_error = format!("{} returned {}", client.name, response.status());
            }
            Err(e) => {
                last_error = format!("{}: {e}", client.name);
            }
        }
    }

    Err(KernelError::TrustConfirmationFailed {
        name: name.to_string(),
        attempted,
        last_error,
    })
}

/// Informational, bounded parallel fan-out. Network/5xx errors are logged
/// and swallowed.
async fn broadcast_upgrade_notification(clients: &ClusterClientSet, dqlite_version: u64) {
    let results = clients
        .query(move |client| async move {
            client
                .http()
                .patch(&client.url("/1.0/internal/database"))
                .header("X-Dqlite-Version", dqlite_version.to_string())
                .send()
                .await
        })
        .await;

    for (peer, result) in results {
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!("Upgrade notification to '{peer}' returned {} (ignored)", response.status());
            }
            Err(e) => {
                warn!("Upgrade notification to '{peer}' failed (ignored): {e}");
            }
        }
    }
}

/// Bounded parallel fan-out; every peer is contacted regardless of earlier
/// failures. A `503` means the peer is still joining and is ignored; any
/// other error is fatal to the join (the first one encountered is returned).
async fn broadcast_new_member(clients: &ClusterClientSet, name: &str) -> KernelResult<()> {
    let body = json!({ "name": name });
    let results = clients
        .query(move |client| {
            let body = body.clone();
            async move { client.http().post(&client.url("/1.0/internal/hooks/newmember")).json(&body).send().await }
        })
        .await;

    for (peer, result) in results {
        match result {
            Ok(response) if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE => {
                info!("Peer '{peer}' still joining; skipped OnNewMember broadcast");
            }
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                return Err(KernelError::Peer(format!(
                    "OnNewMember broadcast to '{peer}' returned {}",
                    response.status()
                )));
            }
            Err(e) => {
                return Err(KernelError::Peer(format!("OnNewMember broadcast to '{peer}' failed: {e}")));
            }
        }
    }
    Ok(())
}
