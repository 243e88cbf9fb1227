//! Server configuration and settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RASTRO_*` environment variable overrides (highest priority)
//!
//! Command line flags are applied by the binary after loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rastro_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Configuration for the HTTP/WebSocket server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`, `0` to auto-assign).
    pub port: u16,
    /// Pending outbound messages per connection before it counts as slow.
    pub send_queue_capacity: usize,
    /// Upper bound on a single socket write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without inbound frames.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for tasks before giving up.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            send_queue_capacity: 64,
            write_timeout_ms: 5_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging section of the settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module levels, e.g. `{"rastro_hub": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingSettings {
    pub fn to_telemetry(&self) -> Result<TelemetryConfig, SettingsError> {
        let log_level = TelemetryConfig::parse_level(&self.level)
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        let module_levels = self
            .modules
            .iter()
            .map(|(module, level)| {
                TelemetryConfig::parse_level(level)
                    .map(|l| (module.clone(), l))
                    .map_err(|e| SettingsError::Invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TelemetryConfig {
            log_level,
            module_levels,
            json: self.json,
        })
    }
}

/// Everything read from the settings file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Resolve the default settings path (`~/.rastro/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rastro").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    Ok(settings)
}

/// Recursive merge: objects merge per key, everything else is replaced by
/// `source`, and nulls in `source` keep the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RASTRO_HOST`, `RASTRO_PORT`, `RASTRO_SEND_QUEUE`, `RASTRO_LOG_LEVEL`
/// and `RASTRO_LOG_JSON` from `lookup`.
pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(host) = lookup("RASTRO_HOST") {
        settings.server.host = host;
    }
    if let Some(port) = lookup("RASTRO_PORT") {
        settings.server.port = port.parse().map_err(|_| SettingsError::InvalidEnv {
            var: "RASTRO_PORT",
            value: port.clone(),
        })?;
    }
    if let Some(queue) = lookup("RASTRO_SEND_QUEUE") {
        settings.server.send_queue_capacity =
            queue.parse().map_err(|_| SettingsError::InvalidEnv {
                var: "RASTRO_SEND_QUEUE",
                value: queue.clone(),
            })?;
    }
    if let Some(level) = lookup("RASTRO_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Some(json) = lookup("RASTRO_LOG_JSON") {
        settings.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
    }
    Ok(())
}
