//! Orchestrator configuration loaded from TOML.

use crate::ledger::{HttpLedger, Ledger, MemoryLedger};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Phase durations and automaton run lengths.
#[derive(Debug, Clone, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds for team picking.
    picking_secs: u32,
    /// Seconds for square placing.
    placing_secs: u32,
    /// Seconds the winner overlay stays up.
    final_secs: u32,
    /// Placing/simulating cycles per game, including the final one.
    max_cycles: u32,
    /// Generations run between intermediate cycles.
    cycle_generations: u32,
    /// Generations run in the final cycle.
    final_generations: u32,
    /// Delay between generations in milliseconds.
    generation_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            picking_secs: 90,
            placing_secs: 60,
            final_secs: 15,
            max_cycles: 1,
            cycle_generations: 25,
            final_generations: 50,
            generation_interval_ms: 200,
        }
    }
}

impl TimingConfig {
    /// Delay between generations.
    pub fn generation_interval(&self) -> Duration {
        Duration::from_millis(self.generation_interval_ms)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    host: String,
    /// Port to bind to.
    port: u16,
    /// Events buffered per WebSocket subscriber.
    event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            event_buffer: 256,
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct StorageConfig {
    /// Crash-recovery snapshot, rewritten every tick.
    snapshot_path: PathBuf,
    /// Append-only list of finished games.
    records_path: PathBuf,
    /// Where the thumbnail renderer publishes images, if anywhere.
    #[setters(strip_option)]
    thumbnail_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("game_state.json"),
            records_path: PathBuf::from("game_records.json"),
            thumbnail_base_url: None,
        }
    }
}

/// Which ledger implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// In-process ledger, for development.
    #[default]
    Memory,
    /// JSON transaction gateway.
    Http,
}

/// Ledger connection settings.
#[derive(Debug, Clone, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct LedgerConfig {
    /// Backend selection.
    backend: LedgerBackend,
    /// Gateway base URL (http backend).
    url: String,
    /// Server account that signs mutations.
    account: String,
    /// Receipt polling interval in milliseconds.
    poll_interval_ms: u64,
    /// Give up waiting for a receipt after this many seconds.
    confirm_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            url: "http://127.0.0.1:8545".to_string(),
            account: String::new(),
            poll_interval_ms: 500,
            confirm_timeout_secs: 60,
        }
    }
}

impl LedgerConfig {
    /// Builds the configured ledger client.
    #[instrument(skip(self), fields(backend = ?self.backend))]
    pub fn connect(&self) -> Arc<dyn Ledger> {
        match self.backend {
            LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
            LedgerBackend::Http => Arc::new(HttpLedger::new(
                self.url.clone(),
                self.account.clone(),
                Duration::from_millis(self.poll_interval_ms),
                Duration::from_secs(self.confirm_timeout_secs),
            )),
        }
    }
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Default, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct GameConfig {
    /// Phase timing.
    timing: TimingConfig,
    /// HTTP listener.
    server: ServerConfig,
    /// Files.
    storage: StorageConfig,
    /// Ledger connection.
    ledger: LedgerConfig,
}

impl GameConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        info!("Config loaded successfully");
        Ok(config)
    }

    /// Loads the file if it exists, otherwise starts from defaults, then
    /// applies environment overrides.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            warn!("Config file not found, using defaults");
            Self::default()
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `LEDGER_URL`, `LEDGER_ACCOUNT` and `PORT`.
    #[instrument(skip(self))]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("LEDGER_URL") {
            debug!(url = %url, "LEDGER_URL override");
            self.ledger.url = url;
            self.ledger.backend = LedgerBackend::Http;
        }
        if let Ok(account) = std::env::var("LEDGER_ACCOUNT") {
            self.ledger.account = account;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            debug!(port, "PORT override");
            self.server.port = port;
        }
        self
    }

    /// Checks values the scheduler cannot run with.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.max_cycles == 0 {
            return Err(ConfigError::new("timing.max_cycles must be at least 1".to_string()));
        }
        if self.ledger.backend == LedgerBackend::Http && self.ledger.account.is_empty() {
            return Err(ConfigError::new(
                "ledger.account is required for the http backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
