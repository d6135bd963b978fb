//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the preview
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the preview server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// The script being previewed and its auxiliary inputs.
    pub project: ProjectConfig,

    /// Filesystem watching.
    pub watch: WatchConfig,

    /// External compiler invocation.
    pub compiler: CompilerConfig,

    /// External validator invocation.
    pub validator: ValidatorConfig,

    /// Live reload channel settings.
    pub reload: ReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Directory the script lives in; static files resolve relative to it.
    pub fn script_dir(&self) -> PathBuf {
        match self.project.script.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "127.0.0.1").
    pub host: String,

    /// TCP port. `0` picks an ephemeral port.
    pub port: u16,
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// The script being previewed.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Path to the YAML script.
    pub script: PathBuf,

    /// Optional assets directory, served under `/assets/`.
    pub assets_dir: Option<PathBuf>,

    /// Optional custom stylesheet handed to the compiler.
    pub custom_css: Option<PathBuf>,

    /// Optional custom script handed to the compiler.
    pub custom_js: Option<PathBuf>,
}

/// Filesystem watch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Recompile on file changes.
    pub enabled: bool,

    /// Quiescence window in milliseconds.
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 300,
        }
    }
}

/// External compiler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Program and arguments. Options are written to its stdin as JSON.
    pub command: Vec<String>,

    /// Abandon a compile after this many seconds (0 = never).
    pub timeout_secs: u64,

    /// Where ephemeral output files are written. Defaults to the system temp dir.
    pub output_dir: Option<PathBuf>,

    /// Free-form metadata passed through to the compiler.
    pub metadata: BTreeMap<String, String>,
}

impl CompilerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec!["vn-compile".to_string(), "--json".to_string()],
            timeout_secs: 60,
            output_dir: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// External validator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Program and arguments. The script content is written to its stdin.
    /// Empty means every script is reported valid.
    pub command: Vec<String>,

    /// Abandon a validation after this many seconds (0 = never).
    pub timeout_secs: u64,
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 30,
        }
    }
}

/// Live reload channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Interval between heartbeat pings in seconds (0 = disabled).
    pub heartbeat_secs: u64,

    /// Evict a client that has been silent for this many seconds.
    pub heartbeat_timeout_secs: u64,

    /// Frames queued per client before it is considered stuck and dropped.
    pub client_buffer: usize,
}

impl ReloadConfig {
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        (self.heartbeat_secs > 0).then(|| Heartbeat {
            interval: Duration::from_secs(self.heartbeat_secs),
            timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        })
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            heartbeat_timeout_secs: 75,
            client_buffer: 32,
        }
    }
}

/// Resolved heartbeat timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Prometheus scrape address (e.g., "127.0.0.1:9100"). Disabled when unset.
    pub metrics_address: Option<String>,
}

/// Convenience for building a config around a script path with defaults elsewhere.
impl From<&Path> for ServerConfig {
    fn from(script: &Path) -> Self {
        let mut config = ServerConfig::default();
        config.project.script = script.to_path_buf();
        config
    }
}
