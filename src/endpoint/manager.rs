// src/endpoint/manager.rs

//! A set of live listeners — one UNIX control socket plus zero or more TLS
//! network sockets — each bound to an HTTP router.
//!
//! TLS hot reload without dropping connections follows `axum-server`'s
//! `RustlsConfig` + `Handle` pattern: the listener's rustls config is a
//! shared handle that can be swapped in place (`reload_from_pem`), and
//! graceful shutdown of one endpoint never touches the others because each
//! owns its own `Handle`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use dashmap::DashMap;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cert::CertMaterial;
use crate::os_layout::OsLayout;

/// Which endpoint(s) a [`EndpointManager::down`] call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointKind {
    ControlSocket,
    /// Every network endpoint.
    Network,
    /// Only the network endpoint bound at this address, leaving every other
    /// listener (including an extension server on a distinct address)
    /// untouched.
    NetworkAddress(String),
}

struct ControlEndpoint {
    path: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

struct NetworkEndpoint {
    tls_config: RustlsConfig,
    handle: Handle,
    join: JoinHandle<()>,
}

/// Owns every bound listener for this node. One instance lives for the
/// lifetime of a running daemon.
#[derive(Default)]
pub struct EndpointManager {
    control: parking_lot::Mutex<Option<ControlEndpoint>>,
    network: DashMap<String, NetworkEndpoint>,
}

impl EndpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the UNIX control socket at `layout.control_socket_path()`,
    /// chgrp'd and chmod'd per `socket_group`, serving `router`.
    pub fn add_control_socket(
        &self,
        layout: &OsLayout,
        socket_group: &str,
        router: Router,
    ) -> Result<()> {
        let path = layout.control_socket_path();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale socket '{}'", path.display()))?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind control socket '{}'", path.display()))?;
        layout
            .chown_socket(&path, socket_group)
            .with_context(|| format!("Failed to set ownership on '{}'", path.display()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let result = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Control socket server exited with an error: {e}");
            }
        });

        *self.control.lock() = Some(ControlEndpoint {
            path: path.clone(),
            shutdown_tx: Some(shutdown_tx),
            join,
        });
        info!("Control socket listening on {}", path.display());
        Ok(())
    }

    /// Binds a TLS network listener at `bind_address` using `cert`, serving
    /// `router`. Keyed by `bind_address`; rebinding the same address replaces
    /// the prior listener.
    pub async fn add_network(
        &self,
        bind_address: &str,
        cert: &CertMaterial,
        router: Router,
    ) -> Result<()> {
        let addr: std::net::SocketAddr = bind_address
            .parse()
            .with_context(|| format!("Invalid bind address '{bind_address}'"))?;
        let tls_config = RustlsConfig::from_pem(cert.cert_pem.clone(), cert.key_pem.clone())
            .await
            .context("Failed to build TLS config from certificate material")?;

        let handle = Handle::new();
        let join = tokio::spawn({
            let tls_config = tls_config.clone();
            let handle = handle.clone();
            async move {
                let result = axum_server::bind_rustls(addr, tls_config)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await;
                if let Err(e) = result {
                    error!("Network endpoint {addr} exited with an error: {e}");
                }
            }
        });

        self.network.insert(
            bind_address.to_string(),
            NetworkEndpoint {
                tls_config,
                handle,
                join,
            },
        );
        info!("Network endpoint listening on {bind_address}");
        Ok(())
    }

    /// Swaps the TLS certificate on every live network endpoint. In-flight
    /// requests complete on the old certificate; only new connections (not
    /// new requests on already-accepted connections) observe the swap.
    pub async fn update_tls(&self, cert: &CertMaterial) -> Result<()> {
        for entry in self.network.iter() {
            entry
                .value()
                .tls_config
                .reload_from_pem(cert.cert_pem.clone(), cert.key_pem.clone())
                .await
                .context("Failed to reload TLS configuration on a network endpoint")?;
        }
        Ok(())
    }

    /// Stops endpoints of the given kind, or all of them if `kind` is `None`.
    /// Network endpoints are given a grace period to drain in-flight
    /// requests before being forced closed.
    pub async fn down(&self, kind: Option<EndpointKind>) {
        if matches!(kind, None | Some(EndpointKind::ControlSocket)) {
            let control = self.control.lock().take();
            if let Some(mut control) = control {
                if let Some(tx) = control.shutdown_tx.take() {
                    let _ = tx.send(());
                }
                let _ = control.join.await;
                let _ = std::fs::remove_file(&control.path);
            }
        }

        match &kind {
            None | Some(EndpointKind::Network) => {
                let keys: Vec<String> = self.network.iter().map(|e| e.key().clone()).collect();
                for key in keys {
                    self.down_network_address(&key).await;
                }
            }
            Some(EndpointKind::NetworkAddress(address)) => {
                self.down_network_address(address).await;
            }
            Some(EndpointKind::ControlSocket) => {}
        }
    }

    async fn down_network_address(&self, address: &str) {
        if let Some((_, endpoint)) = self.network.remove(address) {
            endpoint
                .handle
                .graceful_shutdown(Some(Duration::from_secs(10)));
            let _ = endpoint.join.await;
        }
    }

    pub fn control_socket_path(&self) -> Option<PathBuf> {
        self.control.lock().as_ref().map(|c| c.path.clone())
    }

    pub fn network_addresses(&self) -> Vec<String> {
        self.network.iter().map(|e| e.key().clone()).collect()
    }
}

/// True iff `address` is the empty string or string-equal to `core_address`
/// after both are treated as opaque `host:port` strings. Deliberately never
/// IP equality: two differently-spelled addresses for the same host are
/// treated as distinct.
pub fn address_matches_core(address: Option<&str>, core_address: &str) -> bool {
    match address {
        None => true,
        Some(a) if a.is_empty() => true,
        Some(a) => a == core_address,
    }
}
