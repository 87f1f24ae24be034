// src/lib.rs

//! `clusterd-kernel` turns an ordinary single-node service into a member of a
//! symmetric, Raft-replicated cluster.
//!
//! A consuming project supplies a schema for replicated tables, a set of HTTP
//! resource groups it wants mounted, and lifecycle hooks; the kernel supplies
//! bootstrap, join, heartbeat, membership trust, certificate rotation,
//! multi-listener serving, and graceful shutdown. See [`orchestrator::Orchestrator`]
//! for the entry point.

pub mod cert;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod extension;
pub mod hooks;
pub mod internal_api;
pub mod logging;
pub mod orchestrator;
pub mod os_layout;
pub mod reverter;
pub mod trust;
pub mod watcher;

pub use error::{KernelError, KernelResult};
pub use orchestrator::Orchestrator;
