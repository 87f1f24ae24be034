// src/trust/store.rs

//! Authoritative local view of cluster membership.
//!
//! Backed by a directory of PEM certificates plus a sidecar YAML per remote.
//! Writes are atomic (write + fsync + rename-free overwrite, consistent with
//! [`crate::config::PersistedConfig::save`]); reads serve an in-memory
//! snapshot rebuilt by [`TrustStore::refresh`].

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::remote::{Remote, RemoteSidecar};
use crate::cert::CertMaterial;

/// The local node's view of every other cluster member.
pub struct TrustStore {
    dir: PathBuf,
    remotes: RwLock<HashMap<String, Remote>>,
}

impl TrustStore {
    /// Opens the trust store rooted at `dir`, performing an initial scan.
    /// `dir` is expected to already exist (created by [`crate::os_layout::OsLayout::resolve`]).
    pub fn open(dir: PathBuf) -> Result<Self> {
        let store = Self {
            dir,
            remotes: RwLock::new(HashMap::new()),
        };
        store.refresh()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rescans the directory and rebuilds the in-memory remote list. Intended
    /// to be called in response to a [`crate::watcher::ChangeEvent`] from a
    /// watcher started on [`Self::dir`], but is safe to call unconditionally.
    pub fn refresh(&self) -> Result<()> {
        let mut rebuilt = HashMap::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read trust directory '{}'", self.dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            let cert_path = self.dir.join(format!("{stem}.crt"));
            if !cert_path.exists() {
                warn!("Trust store entry '{stem}' has a sidecar but no certificate; skipping");
                continue;
            }

            let sidecar_bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            let sidecar: RemoteSidecar = serde_yaml::from_slice(&sidecar_bytes)
                .with_context(|| format!("Failed to parse '{}'", path.display()))?;
            let certificate = std::fs::read(&cert_path)
                .with_context(|| format!("Failed to read '{}'", cert_path.display()))?;

            rebuilt.insert(
                sidecar.name.clone(),
                Remote {
                    name: sidecar.name,
                    address: sidecar.address,
                    certificate,
                },
            );
        }

        debug!("Trust store refreshed: {} remote(s)", rebuilt.len());
        *self.remotes.write() = rebuilt;
        Ok(())
    }

    /// Atomically records a remote: writes its certificate and sidecar YAML,
    /// fsyncs both, then updates the in-memory view.
    pub fn add(&self, remote: Remote) -> Result<()> {
        let cert_path = self.dir.join(format!("{}.crt", remote.name));
        let sidecar_path = self.dir.join(format!("{}.yaml", remote.name));

        write_and_fsync(&cert_path, &remote.certificate)?;
        let sidecar = RemoteSidecar {
            name: remote.name.clone(),
            address: remote.address.clone(),
        };
        let sidecar_bytes =
            serde_yaml::to_vec(&sidecar).context("Failed to serialize trust store sidecar")?;
        write_and_fsync(&sidecar_path, &sidecar_bytes)?;

        self.remotes.write().insert(remote.name.clone(), remote);
        Ok(())
    }

    /// Atomically removes a remote, if present.
    pub fn remove(&self, name: &str) -> Result<()> {
        let cert_path = self.dir.join(format!("{name}.crt"));
        let sidecar_path = self.dir.join(format!("{name}.yaml"));
        if cert_path.exists() {
            std::fs::remove_file(&cert_path)
                .with_context(|| format!("Failed to remove '{}'", cert_path.display()))?;
        }
        if sidecar_path.exists() {
            std::fs::remove_file(&sidecar_path)
                .with_context(|| format!("Failed to remove '{}'", sidecar_path.display()))?;
        }
        self.remotes.write().remove(name);
        Ok(())
    }

    /// An immutable snapshot of every known remote.
    pub fn remotes(&self) -> Vec<Remote> {
        self.remotes.read().values().cloned().collect()
    }

    /// True iff a remote with this name is recorded.
    pub fn contains(&self, name: &str) -> bool {
        self.remotes.read().contains_key(name)
    }

    /// Builds a set of mutually authenticated HTTP clients, one per known
    /// remote (excluding `local_name` unless `include_self`), each presenting
    /// `server_cert` as its client identity and trusting only
    /// `cluster_public_key` as a CA.
    pub fn cluster(
        &self,
        local_name: &str,
        include_self: bool,
        server_cert: &CertMaterial,
        cluster_public_key: &[u8],
    ) -> Result<ClusterClientSet> {
        let identity_pem = [server_cert.cert_pem.as_slice(), server_cert.key_pem.as_slice()].concat();
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .context("Failed to build client identity from server certificate")?;
        let root_cert = reqwest::Certificate::from_pem(cluster_public_key)
            .context("Failed to parse cluster public key as a trust anchor")?;

        let mut clients = HashMap::new();
        for remote in self.remotes() {
            if remote.name == local_name && !include_self {
                continue;
            }
            let http = reqwest::Client::builder()
                .use_rustls_tls()
                .tls_built_in_root_certs(false)
                .add_root_certificate(root_cert.clone())
                .identity(identity.clone())
                .build()
                .context("Failed to build mTLS client for remote")?;
            clients.insert(
                remote.name.clone(),
                ClusterClient {
                    name: remote.name.clone(),
                    address: remote.address.clone(),
                    http,
                },
            );
        }
        Ok(ClusterClientSet { clients })
    }
}

fn write_and_fsync(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync '{}'", path.display()))?;
    Ok(())
}

/// A single mTLS-capable HTTP client bound to one cluster peer.
#[derive(Clone)]
pub struct ClusterClient {
    pub name: String,
    pub address: String,
    http: reqwest::Client,
}

impl ClusterClient {
    /// Builds `https://<address><path>`.
    pub fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.address, path)
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Caps how many peer RPCs [`ClusterClientSet::query`] runs at once. Clusters
/// in this system are small (single-digit to low hundreds of members), so
/// this is generous headroom rather than a tuned value.
const QUERY_CONCURRENCY: usize = 8;

/// The per-remote client set returned by [`TrustStore::cluster`]. Sequential
/// callers (trust confirmation's first-success-wins search) use
/// [`Self::clients`]; broadcasts use [`Self::query`].
pub struct ClusterClientSet {
    clients: HashMap<String, ClusterClient>,
}

impl ClusterClientSet {
    pub fn clients(&self) -> impl Iterator<Item = &ClusterClient> {
        self.clients.values()
    }

    pub fn get(&self, name: &str) -> Option<&ClusterClient> {
        self.clients.get(name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Runs `op` against every client with a bounded degree of parallelism,
    /// returning each client's name paired with its result. A slow or failing
    /// peer never blocks or cancels the others — it only shows up in that
    /// peer's own result.
    pub async fn query<F, Fut, T>(&self, op: F) -> Vec<(String, T)>
    where
        F: Fn(ClusterClient) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(self.clients.values().cloned())
            .map(|client| {
                let name = client.name.clone();
                let op = &op;
                async move { (name, op(client).await) }
            })
            .buffer_unordered(QUERY_CONCURRENCY)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_remote(name: &str) -> Remote {
        Remote {
            name: name.to_string(),
            address: format!("{name}.example:7000"),
            certificate: b"fake-der-bytes".to_vec(),
        }
    }

    #[test]
    fn add_then_refresh_recovers_remote_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(dir.path().to_path_buf()).unwrap();
        store.add(make_remote("alpha")).unwrap();

        let reopened = TrustStore::open(dir.path().to_path_buf()).unwrap();
        let remotes = reopened.remotes();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "alpha");
    }

    #[test]
    fn remove_deletes_cert_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(dir.path().to_path_buf()).unwrap();
        store.add(make_remote("beta")).unwrap();
        assert!(store.contains("beta"));

        store.remove("beta").unwrap();
        assert!(!store.contains("beta"));
        assert!(!dir.path().join("beta.crt").exists());
        assert!(!dir.path().join("beta.yaml").exists());
    }

    #[test]
    fn sidecar_without_certificate_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ghost.yaml"),
            serde_yaml::to_vec(&RemoteSidecar {
                name: "ghost".into(),
                address: "ghost:7000".into(),
            })
            .unwrap(),
        )
        .unwrap();
        let store = TrustStore::open(dir.path().to_path_buf()).unwrap();
        assert!(store.remotes().is_empty());
    }
}
