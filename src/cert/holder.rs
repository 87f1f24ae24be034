// src/cert/holder.rs

//! Two independent credentials behind a single reader-writer lock: the
//! *server* certificate (stable per node) and the *cluster* certificate
//! (shared by all members, hot-reloadable).
//!
//! Every read of the cluster cert returns a fresh clone of the underlying
//! PEM material to avoid aliasing live crypto state across callers, matching
//! the invariant in §4.4.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use parking_lot::RwLock;
use rustls_pki_types::CertificateDer;
use tracing::info;

use super::generate::generate_self_signed;

/// PEM-encoded certificate + key, plus a parsed DER chain for rustls consumers.
#[derive(Debug, Clone)]
pub struct CertMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub chain: Vec<CertificateDer<'static>>,
}

impl CertMaterial {
    fn from_pem_bytes(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Result<Self> {
        let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to parse certificate chain")?;
        if chain.is_empty() {
            return Err(anyhow!("no certificates found in PEM material"));
        }
        Ok(Self {
            cert_pem,
            key_pem,
            chain,
        })
    }

    fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)
            .with_context(|| format!("Failed to read certificate '{}'", cert_path.display()))?;
        let key_pem = std::fs::read(key_path)
            .with_context(|| format!("Failed to read private key '{}'", key_path.display()))?;
        Self::from_pem_bytes(cert_pem, key_pem)
    }

    fn generate_and_persist(common_name: &str, cert_path: &Path, key_path: &Path) -> Result<Self> {
        let generated = generate_self_signed(common_name)?;
        std::fs::write(cert_path, &generated.cert_pem)
            .with_context(|| format!("Failed to write '{}'", cert_path.display()))?;
        std::fs::write(key_path, &generated.key_pem)
            .with_context(|| format!("Failed to write '{}'", key_path.display()))?;
        Self::from_pem_bytes(
            generated.cert_pem.into_bytes(),
            generated.key_pem.into_bytes(),
        )
    }
}

/// Holds the node's server certificate (immutable after load) and the
/// cluster certificate (swappable via [`CertHolder::reload_cluster_cert`]).
pub struct CertHolder {
    server: CertMaterial,
    cluster: RwLock<Option<CertMaterial>>,
}

impl CertHolder {
    /// Loads the server cert from `<state>/server.{crt,key}`, generating a
    /// fresh self-signed one if absent.
    pub fn load_or_generate_server_cert(
        node_name: &str,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self> {
        let server = if cert_path.exists() && key_path.exists() {
            CertMaterial::load(cert_path, key_path)?
        } else {
            info!("No server certificate found; generating a new self-signed one");
            CertMaterial::generate_and_persist(node_name, cert_path, key_path)?
        };
        Ok(Self {
            server,
            cluster: RwLock::new(None),
        })
    }

    /// Returns a clone of the server certificate material.
    pub fn server_cert(&self) -> CertMaterial {
        self.server.clone()
    }

    /// Returns a clone of the current cluster certificate material, if one has
    /// been generated or reloaded yet.
    pub fn cluster_cert(&self) -> Option<CertMaterial> {
        self.cluster.read().clone()
    }

    /// Generates a brand-new cluster certificate at bootstrap time and
    /// persists it under `<state>/cluster.{crt,key}`.
    pub fn generate_cluster_cert(
        &self,
        project_name: &str,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<CertMaterial> {
        let material = CertMaterial::generate_and_persist(project_name, cert_path, key_path)?;
        *self.cluster.write() = Some(material.clone());
        Ok(material)
    }

    /// Reloads the cluster certificate from disk. Expected to have been
    /// handed to this node out-of-band (e.g. via a join token) before a join
    /// is attempted — see the open question recorded in DESIGN.md.
    pub fn reload_cluster_cert(&self, cert_path: &Path, key_path: &Path) -> Result<CertMaterial> {
        if !cert_path.exists() || !key_path.exists() {
            return Err(anyhow!(
                "cluster certificate not present at '{}' / '{}'; it must be provisioned out-of-band before joining",
                cert_path.display(),
                key_path.display()
            ));
        }
        let material = CertMaterial::load(cert_path, key_path)?;
        *self.cluster.write() = Some(material.clone());
        info!("Cluster certificate reloaded");
        Ok(material)
    }
}
