// src/config.rs

//! The kernel's two configuration surfaces.
//!
//! `RuntimeConfig` holds the embedder-supplied, non-persisted knobs passed
//! into [`crate::orchestrator::Orchestrator::run`]. `PersistedConfig` is the
//! on-disk `daemon.yaml` described in the external interfaces: `{name,
//! address}`, written atomically and read at every restart.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Embedder-supplied knobs passed to `Run`. Not persisted.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Network listen port. Empty means "no network listener, control socket only".
    pub listen_port: Option<u16>,
    /// Root of the state directory. Falls back to the `STATE_DIR` env var if unset.
    pub state_dir: Option<PathBuf>,
    /// Unix group that should own the control socket.
    pub socket_group: Option<String>,
    /// Initial log level, used to seed the reloadable `EnvFilter`.
    #[allow(dead_code)]
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen_port: None,
            state_dir: None,
            socket_group: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RuntimeConfig {
    /// Resolves the state directory: explicit argument wins, then `STATE_DIR`, else an error.
    pub fn resolve_state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var("STATE_DIR") {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        Err(anyhow!(
            "no state directory configured: pass one explicitly or set STATE_DIR"
        ))
    }

    /// Validates logical consistency of the runtime knobs.
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = self.listen_port
            && port == 0
        {
            return Err(anyhow!("listen_port cannot be 0 when set"));
        }
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("log_level cannot be empty"));
        }
        Ok(())
    }
}

/// The persisted `<state>/daemon.yaml` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedConfig {
    pub name: String,
    pub address: String,
}

impl PersistedConfig {
    /// Reads and parses `daemon.yaml` from the given state directory, if present.
    pub fn load(state_dir: &std::path::Path) -> Result<Option<Self>> {
        let path = state_dir.join("daemon.yaml");
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let cfg: PersistedConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML from '{}'", path.display()))?;
        Ok(Some(cfg))
    }

    /// Writes `daemon.yaml` atomically: write to a temp file, fsync, then rename.
    pub fn save(&self, state_dir: &std::path::Path) -> Result<()> {
        let path = state_dir.join("daemon.yaml");
        let tmp_path = state_dir.join(format!("daemon.yaml.tmp-{}", std::process::id()));
        let content =
            serde_yaml::to_string(self).context("Failed to serialize daemon.yaml contents")?;

        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("Failed to create '{}'", tmp_path.display()))?;
            use std::io::Write;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to persist '{}'", path.display()))?;
        info!("Persisted config written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_config_rejects_zero_port() {
        let cfg = RuntimeConfig {
            listen_port: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn persisted_config_roundtrips_through_atomic_save() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PersistedConfig {
            name: "alpha".into(),
            address: "0.0.0.0:7000".into(),
        };
        cfg.save(dir.path()).unwrap();
        let loaded = PersistedConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn persisted_config_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PersistedConfig::load(dir.path()).unwrap().is_none());
    }
}
