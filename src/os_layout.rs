// src/os_layout.rs

//! Resolves and validates the state directory tree, and derives every path
//! the other components need: the control-socket path, trust directory,
//! database directory, and certificate files.
//!
//! ```text
//! <state>/
//!   server.{crt,key}
//!   cluster.{crt,key}
//!   daemon.yaml
//!   control.socket
//!   truststore/
//!     <remote>.crt
//!     <remote>.yaml
//!   database/
//!     info.yaml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OsLayout {
    root: PathBuf,
}

impl OsLayout {
    /// Resolves the state directory, creating it (and the fixed subtree) if
    /// it doesn't exist yet. Returns an error if `root` exists but is not a
    /// directory.
    pub fn resolve(root: PathBuf) -> Result<Self> {
        if root.exists() && !root.is_dir() {
            return Err(anyhow!(
                "state directory path '{}' exists but is not a directory",
                root.display()
            ));
        }
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create state directory '{}'", root.display()))?;
        std::fs::create_dir_all(root.join("truststore"))
            .context("Failed to create truststore directory")?;
        std::fs::create_dir_all(root.join("database"))
            .context("Failed to create database directory")?;
        info!("State directory resolved to {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_cert_path(&self) -> PathBuf {
        self.root.join("server.crt")
    }

    pub fn server_key_path(&self) -> PathBuf {
        self.root.join("server.key")
    }

    pub fn cluster_cert_path(&self) -> PathBuf {
        self.root.join("cluster.crt")
    }

    pub fn cluster_key_path(&self) -> PathBuf {
        self.root.join("cluster.key")
    }

    pub fn daemon_config_path(&self) -> PathBuf {
        self.root.join("daemon.yaml")
    }

    pub fn control_socket_path(&self) -> PathBuf {
        self.root.join("control.socket")
    }

    pub fn trust_dir(&self) -> PathBuf {
        self.root.join("truststore")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    pub fn database_info_path(&self) -> PathBuf {
        self.database_dir().join("info.yaml")
    }

    /// True once a prior bootstrap or join has left its mark on disk.
    pub fn is_bootstrapped_on_disk(&self) -> bool {
        self.database_info_path().exists() && self.daemon_config_path().exists()
    }

    /// Binds the control socket's group ownership and mode. No-op on non-unix.
    #[cfg(unix)]
    pub fn chown_socket(&self, path: &Path, group: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let gid = group_id_for_name(group)
            .with_context(|| format!("Unknown socket group '{group}'"))?;
        std::os::unix::fs::chown(path, None, Some(gid))
            .with_context(|| format!("Failed to chgrp '{}' to '{group}'", path.display()))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
            .with_context(|| format!("Failed to chmod '{}'", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn chown_socket(&self, _path: &Path, _group: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn group_id_for_name(name: &str) -> Result<u32> {
    // Numeric GIDs are accepted directly; named groups are resolved via libc's
    // getgrnam, the standard mechanism for this lookup on unix.
    if let Ok(gid) = name.parse::<u32>() {
        return Ok(gid);
    }
    use std::ffi::CString;
    let c_name = CString::new(name).context("group name contains an interior NUL")?;
    let grp = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if grp.is_null() {
        return Err(anyhow!("group '{name}' not found"));
    }
    unsafe { Ok((*grp).gr_gid) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_creates_fixed_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("state");
        let layout = OsLayout::resolve(root.clone()).unwrap();
        assert!(layout.trust_dir().is_dir());
        assert!(layout.database_dir().is_dir());
        assert_eq!(layout.root(), root.as_path());
    }

    #[test]
    fn resolve_rejects_non_directory_root() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").unwrap();
        assert!(OsLayout::resolve(file_path).is_err());
    }

    #[test]
    fn not_bootstrapped_until_both_markers_exist() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OsLayout::resolve(dir.path().to_path_buf()).unwrap();
        assert!(!layout.is_bootstrapped_on_disk());
        std::fs::write(layout.database_info_path(), b"x").unwrap();
        assert!(!layout.is_bootstrapped_on_disk());
        std::fs::write(layout.daemon_config_path(), b"x").unwrap();
        assert!(layout.is_bootstrapped_on_disk());
    }
}
