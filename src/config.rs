//! Startup configuration.
//!
//! Built once in `main` and passed by value (or `Arc`) into every component;
//! nothing reads process-wide settings after startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ServerError;

/// Env var naming a YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "CONNECTOR_CONFIG";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Interface to bind.
    pub host: String,
    /// Listening port; 0 picks an ephemeral port.
    pub port: u16,
    /// Number of poller shards.
    pub poller_threads: usize,
    /// Fixed size of the worker pool.
    pub worker_threads: usize,
    /// Idle time after which the reaper closes a connection.
    pub connection_idle_ms: u64,
    /// Period of the connection reaper.
    pub connection_eviction_ms: u64,
    /// Idle time after which a session is dropped.
    pub session_idle_ms: u64,
    /// Period of the session reaper.
    pub session_eviction_ms: u64,
    /// Root directory of the static-resource fallback.
    pub static_root: PathBuf,
    /// Optional `ext=type` table; the built-in table is used when absent.
    pub mime_table: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            poller_threads: 2,
            worker_threads: 16,
            connection_idle_ms: 60_000,
            connection_eviction_ms: 10_000,
            session_idle_ms: 30 * 60_000,
            session_eviction_ms: 60_000,
            static_root: PathBuf::from("webapp"),
            mime_table: None,
        }
    }
}

impl Config {
    /// Loads the file named by `CONNECTOR_CONFIG` (defaults when unset), then
    /// applies `CONNECTOR_PORT`, `CONNECTOR_POLLERS` and `CONNECTOR_WORKERS`.
    pub fn load() -> Result<Self, ServerError> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Some(port) = env_override("CONNECTOR_PORT")? {
            cfg.port = port;
        }
        if let Some(pollers) = env_override("CONNECTOR_POLLERS")? {
            cfg.poller_threads = pollers;
        }
        if let Some(workers) = env_override("CONNECTOR_WORKERS")? {
            cfg.worker_threads = workers;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ServerError> {
        let cfg: Self =
            serde_yaml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let checks = [
            (self.poller_threads == 0, "poller_threads must be at least 1"),
            (self.worker_threads == 0, "worker_threads must be at least 1"),
            (self.connection_eviction_ms == 0, "connection_eviction_ms must be positive"),
            (self.session_eviction_ms == 0, "session_eviction_ms must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(ServerError::Config((*msg).to_string())),
            None => Ok(()),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_idle(&self) -> Duration {
        Duration::from_millis(self.connection_idle_ms)
    }

    pub fn connection_eviction(&self) -> Duration {
        Duration::from_millis(self.connection_eviction_ms)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_millis(self.session_idle_ms)
    }

    pub fn session_eviction(&self) -> Duration {
        Duration::from_millis(self.session_eviction_ms)
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ServerError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServerError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
