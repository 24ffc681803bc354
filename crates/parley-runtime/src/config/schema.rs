//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_framework::StreamConfig;

/// Root configuration structure.
///
/// ```toml
/// [app]
/// name = "helpdesk"
/// oauth_connection = "graph"
///
/// [streaming]
/// interval_ms = 500
///
/// [logging]
/// level = "debug"
///
/// [plugins.http]
/// port = 3978
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ParleyConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form per-plugin sections, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

// =============================================================================
// App
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Bot (application) id registered with the platform.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default = "default_app_name")]
    pub name: String,

    /// OAuth connection used to look up the sender's user token.
    #[serde(default = "default_oauth_connection")]
    pub oauth_connection: String,

    /// Close the dispatch's stream even when a handler failed.
    #[serde(default)]
    pub close_stream_on_error: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: default_app_name(),
            oauth_connection: default_oauth_connection(),
            close_stream_on_error: false,
        }
    }
}

fn default_app_name() -> String {
    "parley".to_string()
}

fn default_oauth_connection() -> String {
    "graph".to_string()
}

// =============================================================================
// Streaming
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_close_poll_ms")]
    pub close_poll_ms: u64,

    #[serde(default = "default_batch_divisor")]
    pub batch_divisor: usize,

    #[serde(default = "default_final_retries")]
    pub final_retries: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            interval_ms: default_interval_ms(),
            close_poll_ms: default_close_poll_ms(),
            batch_divisor: default_batch_divisor(),
            final_retries: default_final_retries(),
        }
    }
}

impl StreamingConfig {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            interval: Duration::from_millis(self.interval_ms),
            close_poll: Duration::from_millis(self.close_poll_ms),
            batch_divisor: self.batch_divisor,
            final_retries: self.final_retries,
        }
    }
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_interval_ms() -> u64 {
    500
}

fn default_close_poll_ms() -> u64 {
    200
}

fn default_batch_divisor() -> usize {
    10
}

fn default_final_retries() -> u32 {
    2
}

// =============================================================================
// Credentials
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    /// Maximum number of tenants whose app token is cached.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Upper bound on how long a cached app token is reused.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    1024
}

fn default_ttl_secs() -> u64 {
    3000
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `parley_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}
