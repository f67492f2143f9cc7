//! Configuration for stake-server.
//!
//! Supports loading from TOML file with environment variable and CLI
//! overrides. Every field has a default, so an empty file is valid.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use stake_book::{LockingStrategy, MAX_CAPACITY};

use crate::session::{SessionStoreConfig, TimeSource};

/// Top-level configuration for stake-server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Logging level.
    pub log_level: String,

    /// Listener settings.
    pub http: HttpConfig,

    /// Ranking parameters.
    pub leaderboard: LeaderboardConfig,

    /// Session parameters.
    pub session: SessionConfig,
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Interface to bind.
    pub host: String,

    /// Port to bind (0 picks an ephemeral port).
    pub port: u16,
}

impl HttpConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

/// Ranking parameters.
#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    /// Entries kept per market.
    pub capacity: usize,

    /// Entries returned by a high-stakes query.
    pub top_limit: usize,

    /// Registry locking strategy.
    pub locking: LockingStrategy,
}

impl LeaderboardConfig {
    /// Capacity as the type leaderboards are built from.
    pub fn capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.capacity).context("leaderboard capacity must be at least 1")
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            top_limit: 20,
            locking: LockingStrategy::Sharded,
        }
    }
}

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session key stays valid after issue.
    pub timeout: Duration,

    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
}

impl SessionConfig {
    /// Store settings running on the wall clock.
    pub fn store_config(&self) -> Result<SessionStoreConfig> {
        let timeout = chrono::Duration::from_std(self.timeout)
            .context("session timeout out of range")?;
        Ok(SessionStoreConfig {
            timeout,
            time_source: TimeSource::WallClock,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(TomlConfig::default())
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply environment variable overrides.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("STAKE_HOST") {
            self.http.host = host;
        }
        if let Some(port) = var("STAKE_PORT").and_then(|p| p.parse().ok()) {
            self.http.port = port;
        }
        if let Some(level) = var("STAKE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(secs) = var("STAKE_SESSION_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.session.timeout = Duration::from_secs(secs);
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        log_level: Option<String>,
    ) {
        if let Some(host) = host {
            self.http.host = host;
        }
        if let Some(port) = port {
            self.http.port = port;
        }
        if let Some(level) = log_level
            && !level.is_empty()
        {
            self.log_level = level;
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.leaderboard.capacity == 0 {
            bail!("leaderboard.capacity must be at least 1");
        }
        if self.leaderboard.capacity > MAX_CAPACITY {
            bail!("leaderboard.capacity is too large");
        }
        if self.leaderboard.top_limit == 0 {
            bail!("leaderboard.top_limit must be at least 1");
        }
        if self.session.timeout < Duration::from_secs(1) {
            bail!("session.timeout_secs must be at least 1");
        }
        if self.session.sweep_interval < Duration::from_secs(1) {
            bail!("session.sweep_interval_secs must be at least 1");
        }
        if chrono::Duration::from_std(self.session.timeout).is_err() {
            bail!("session.timeout_secs is too large");
        }
        if self.http.host.is_empty() {
            bail!("server.host must not be empty");
        }
        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    server: ServerToml,
    #[serde(default)]
    leaderboard: LeaderboardToml,
    #[serde(default)]
    session: SessionToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerToml {
    host: String,
    port: u16,
}

impl Default for ServerToml {
    fn default() -> Self {
        let http = HttpConfig::default();
        Self {
            host: http.host,
            port: http.port,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LeaderboardToml {
    capacity: usize,
    top_limit: usize,
    locking: LockingStrategy,
}

impl Default for LeaderboardToml {
    fn default() -> Self {
        let board = LeaderboardConfig::default();
        Self {
            capacity: board.capacity,
            top_limit: board.top_limit,
            locking: board.locking,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SessionToml {
    timeout_secs: u64,
    sweep_interval_secs: u64,
}

impl Default for SessionToml {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            timeout_secs: session.timeout.as_secs(),
            sweep_interval_secs: session.sweep_interval.as_secs(),
        }
    }
}

impl From<TomlConfig> for ServerConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            log_level: toml.general.log_level,
            http: HttpConfig {
                host: toml.server.host,
                port: toml.server.port,
            },
            leaderboard: LeaderboardConfig {
                capacity: toml.leaderboard.capacity,
                top_limit: toml.leaderboard.top_limit,
                locking: toml.leaderboard.locking,
            },
            session: SessionConfig {
                timeout: Duration::from_secs(toml.session.timeout_secs),
                sweep_interval: Duration::from_secs(toml.session.sweep_interval_secs),
            },
        }
    }
}
