// src/error.rs

//! The primary error taxonomy for the kernel.
//!
//! Mirrors the shape of a `thiserror`-derived error enum: every variant wraps
//! a human-readable message so callers can match on failure class without
//! losing the underlying cause. Internal call sites are free to use
//! `anyhow::Result` for ad-hoc composition; they convert to [`KernelError`]
//! at the public surface (`Orchestrator::run`, `Orchestrator::start_api`, ...).

use std::sync::Arc;
use thiserror::Error;

pub type KernelResult<T> = Result<T, KernelError>;

/// The error enum surfaced across the kernel's public API.
#[derive(Error, Debug, Clone)]
pub enum KernelError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Missing state dir, unparseable address, missing cluster cert at join, etc.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to bind or swap TLS on an endpoint.
    #[error("Endpoint error: {0}")]
    Endpoint(String),

    /// A peer RPC (trust confirmation, upgrade notification, new-member broadcast) failed.
    #[error("Peer RPC error: {0}")]
    Peer(String),

    /// The replicated database facade returned an error.
    #[error("Database error: {0}")]
    Database(String),

    /// A fatal hook invocation failed.
    #[error("Hook error: {0}")]
    Hook(String),

    /// `StartAPI` was called more than once, or out of sequence for the current state.
    #[error("Invalid lifecycle transition: {0}")]
    InvalidState(String),

    /// The join path's trust-confirmation sub-protocol exhausted every peer.
    #[error("failed to confirm new member \"{name}\" on any existing system ({attempted}): {last_error}")]
    TrustConfirmationFailed {
        name: String,
        attempted: usize,
        last_error: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for KernelError {
    fn from(e: std::io::Error) -> Self {
        KernelError::Io(Arc::new(e))
    }
}

impl From<anyhow::Error> for KernelError {
    fn from(e: anyhow::Error) -> Self {
        KernelError::Internal(format!("{e:#}"))
    }
}
