// src/extension.rs

//! Extensions (opaque capability tags) and extension servers (embedder
//! resource groups optionally mounted on their own address/certificate).

use anyhow::{Result, anyhow};
use axum::Router;

use crate::cert::CertMaterial;

/// An opaque capability tag registered once, in the order supplied.
/// Equality and ordering are by name; the kernel never interprets the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension(String);

impl Extension {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flags controlling how an [`ExtensionServer`] is mounted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionServerFlags {
    /// Also reachable over the UNIX control socket.
    pub serve_unix: bool,
    /// Bound during `Run.init`, before bootstrap/join has run.
    pub pre_init: bool,
    /// Mounted under the core `/1.0` path tree rather than its own prefix.
    pub core_api: bool,
}

/// An embedder-supplied group of HTTP resources, optionally with its own
/// bind address and certificate, mounted alongside the core servers.
pub struct ExtensionServer {
    pub resource_group: Router,
    /// `host:port`; `None` or empty means "bind with the core network
    /// listener" — see [`crate::endpoint::address_matches_core`].
    pub address: Option<String>,
    pub certificate: Option<CertMaterial>,
    pub flags: ExtensionServerFlags,
    /// The mount prefix this resource group's paths live under, used to
    /// check disjointness against the internal (`/1.0/internal`) and public
    /// (`/1.0`) path trees.
    pub mount_prefix: String,
}

const RESERVED_PREFIXES: &[&str] = &["/1.0/internal", "/1.0"];

/// Validates that no extension server's mount prefix collides with the
/// internal or public path trees, or with another extension server's prefix.
/// Called once during `Run.init`.
pub fn validate_resource_paths(servers: &[ExtensionServer]) -> Result<()> {
    let mut seen: Vec<&str> = Vec::new();
    for server in servers {
        let prefix = server.mount_prefix.as_str();
        for reserved in RESERVED_PREFIXES {
            if prefix == *reserved {
                return Err(anyhow!(
                    "extension server mount prefix '{prefix}' collides with the reserved path '{reserved}'"
                ));
            }
        }
        if seen.contains(&prefix) {
            return Err(anyhow!(
                "extension server mount prefix '{prefix}' is registered more than once"
            ));
        }
        seen.push(prefix);
    }
    Ok(())
}
