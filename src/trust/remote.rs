// src/trust/remote.rs

//! A single recorded cluster peer.

use serde::{Deserialize, Serialize};

/// One entry in the trust store: a peer's logical name, listen address, and
/// X.509 certificate (DER).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub address: String,
    pub certificate: Vec<u8>,
}

/// The sidecar YAML written alongside each remote's `.crt` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct RemoteSidecar {
    pub name: String,
    pub address: String,
}
