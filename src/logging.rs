// src/logging.rs

//! Structured logging setup with a runtime-reloadable filter: a
//! `tracing_subscriber::reload::Handle` is stashed away so verbosity can
//! change without a restart, then threaded through the orchestrator so hooks
//! (and the `ConfigUpdate`-style internal path an embedder wires up) can
//! reach it via the state accessor.

use anyhow::{Context, Result};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Wraps the live `EnvFilter` reload handle. Cloning is cheap; every clone
/// reloads the same global subscriber.
#[derive(Clone)]
pub struct LogController {
    handle: FilterHandle,
}

impl LogController {
    /// Installs the global subscriber with a compact formatter and a
    /// reloadable `EnvFilter` seeded from `initial_level`, and returns a
    /// handle for later reloads. Call once per process.
    pub fn init(initial_level: &str) -> Result<Self> {
        let (filter, handle) = reload::Layer::new(EnvFilter::new(initial_level));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
            .try_init()
            .context("Failed to install the global tracing subscriber")?;
        Ok(Self { handle })
    }

    /// Replaces the live filter directive string, e.g. in response to a
    /// propagated `ConfigUpdate`.
    pub fn set_level(&self, level: &str) -> Result<()> {
        self.handle
            .modify(|filter| *filter = EnvFilter::new(level))
            .context("Failed to reload the tracing EnvFilter")
    }
}
