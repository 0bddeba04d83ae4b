//! Client configuration.
//!
//! Configuration is resolved once at startup by [`ClientConfig::load`] and
//! then handed, immutable, to the connection manager. Layers, lowest to
//! highest priority:
//!
//! 1. Built-in defaults ([`ClientConfig::default`])
//! 2. An optional config file (any format the `config` crate understands)
//! 3. `VALVEWATCH_*` environment variables (`__` separates nested keys,
//!    `VALVEWATCH_ENDPOINTS` is a comma-separated list)
//! 4. A preferred endpoint (`endpoint` key / `VALVEWATCH_ENDPOINT`)
//! 5. An endpoint previously added at runtime and persisted to disk
//!
//! Preferred endpoints are moved to the front of the candidate list.
//!
//! ```toml
//! endpoints = ["ws://plant-gw:1880/ws/dados"]
//! batch_interval_ms = 50
//!
//! [reconnect]
//! max_attempts = 5
//!
//! [coil]
//! policy = "immediate"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "VALVEWATCH";

/// Endpoints tried when nothing else is configured.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "ws://127.0.0.1:1880/ws/dados",
    "ws://192.168.15.4:1880/ws/dados",
    "ws://localhost:1880/ws/dados",
];

/// Reconnection backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Reconnects allowed per endpoint before failing over.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 20,
        }
    }
}

/// How coil/actuator label changes reach the readings handed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoilPolicy {
    /// Apply a changed label pair as soon as it is observed.
    Immediate,
    /// Hold a changed pair back until it has been stable for the hold period.
    #[default]
    Debounce,
}

impl FromStr for CoilPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(CoilPolicy::Immediate),
            "debounce" => Ok(CoilPolicy::Debounce),
            other => Err(ConfigError::Invalid(format!(
                "unknown coil policy '{}' (expected immediate or debounce)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoilConfig {
    pub policy: CoilPolicy,
    pub hold_ms: u64,
}

impl Default for CoilConfig {
    fn default() -> Self {
        Self {
            policy: CoilPolicy::Debounce,
            hold_ms: 10_000,
        }
    }
}

/// Delays used when moving between endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Retry delay after failing over from `connect()`.
    pub from_connect_ms: u64,
    /// Retry delay after failing over from the close path.
    pub from_close_ms: u64,
    /// Reconnect delay after an endpoint is added or switched manually.
    pub endpoint_change_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            from_connect_ms: 2000,
            from_close_ms: 5000,
            endpoint_change_ms: 1000,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Candidate endpoints in failover order.
    pub endpoints: Vec<String>,
    /// Preferred endpoint, moved to the front of `endpoints`.
    pub endpoint: Option<String>,
    /// File holding an endpoint added at runtime, if persistence is wanted.
    pub persist_path: Option<PathBuf>,
    /// Readings kept in the rolling display window.
    pub max_data_points: usize,
    pub batch_interval_ms: u64,
    pub reconnect: ReconnectConfig,
    pub connection_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Queue depth used for the 80% high-water mark.
    pub max_queue_size: usize,
    /// Metrics sampling period.
    pub performance_throttle_ms: u64,
    pub enable_validation: bool,
    pub enable_security: bool,
    pub endpoint_rotation: bool,
    pub auto_reconnect: bool,
    pub alerts_enabled: bool,
    pub coil: CoilConfig,
    pub failover: FailoverConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            endpoint: None,
            persist_path: None,
            max_data_points: 150,
            batch_interval_ms: 75,
            reconnect: ReconnectConfig::default(),
            connection_timeout_ms: 15_000,
            heartbeat_interval_ms: 18_000,
            max_queue_size: 1000,
            performance_throttle_ms: 100,
            enable_validation: true,
            enable_security: true,
            endpoint_rotation: true,
            auto_reconnect: true,
            alerts_enabled: true,
            coil: CoilConfig::default(),
            failover: FailoverConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading variables from `env` instead of the
    /// process environment when it is provided.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&ClientConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("endpoints")
            .try_parsing(true)
            .source(env);

        let mut config: ClientConfig = builder.add_source(environment).build()?.try_deserialize()?;

        if let Some(preferred) = config.endpoint.take() {
            config.prefer_endpoint(preferred);
        }
        if let Some(persisted) = config.load_persisted_endpoint()? {
            config.prefer_endpoint(persisted);
        }
        config.dedupe_endpoints();
        config.validate()?;

        Ok(config)
    }

    /// Move `url` to the front of the endpoint list.
    fn prefer_endpoint(&mut self, url: String) {
        let url = url.trim().to_string();
        if url.is_empty() {
            return;
        }
        self.endpoints.retain(|e| e != &url);
        self.endpoints.insert(0, url);
    }

    fn dedupe_endpoints(&mut self) {
        let mut seen = Vec::with_capacity(self.endpoints.len());
        for endpoint in self.endpoints.drain(..) {
            let endpoint = endpoint.trim().to_string();
            if !endpoint.is_empty() && !seen.contains(&endpoint) {
                seen.push(endpoint);
            }
        }
        self.endpoints = seen;
    }

    fn load_persisted_endpoint(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.persist_path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let url = contents.trim();
        Ok((!url.is_empty()).then(|| url.to_string()))
    }

    /// Persist a runtime-added endpoint so the next startup prefers it.
    ///
    /// A no-op when no persistence path is configured.
    pub fn persist_endpoint(&self, url: &str) -> Result<(), ConfigError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, url)?;
        Ok(())
    }

    /// Check that the resolved configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid("at least one endpoint is required".into()));
        }
        if let Some(bad) = self.endpoints.iter().find(|e| !is_websocket_url(e)) {
            return Err(ConfigError::Invalid(format!(
                "endpoint '{}' must use ws:// or wss://",
                bad
            )));
        }

        let non_zero = [
            ("batch_interval_ms", self.batch_interval_ms),
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("performance_throttle_ms", self.performance_throttle_ms),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
            ("max_data_points", self.max_data_points as u64),
            ("max_queue_size", self.max_queue_size as u64),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid("reconnect.max_attempts must be at least 1".into()));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn performance_throttle(&self) -> Duration {
        Duration::from_millis(self.performance_throttle_ms)
    }

    pub fn coil_hold(&self) -> Duration {
        Duration::from_millis(self.coil.hold_ms)
    }

    /// Queue length at which a flush is forced.
    pub fn high_water_mark(&self) -> usize {
        self.max_queue_size * 4 / 5
    }
}

/// Whether `url` uses a WebSocket scheme.
pub fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}
