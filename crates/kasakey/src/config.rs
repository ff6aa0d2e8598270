//! Configuration file parsing and structures.
//!
//! kasakey takes its device list from the command line and everything else
//! from an optional TOML file:
//! - `[logging]`: level and per-target overrides
//! - `[device]`: port, timeouts and dispatch mode for plug commands
//! - `[api]`: the optional HTTP API server

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::kasa::protocol::DEFAULT_PORT;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"kasakey::kasa" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// How key presses are turned into plug commands
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Await each toggle before reading the next key
    #[default]
    Inline,
    /// Run each toggle on its own task
    Spawn,
}

/// Settings for talking to plugs
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// TCP port plugs listen on
    pub port: u16,

    /// Time allowed to establish the TCP connection
    pub connect_timeout_ms: u64,

    /// Deadline for writing the request and reading the response,
    /// counted from the moment the connection is established
    pub io_timeout_ms: u64,

    /// Upper bound on a single response
    pub max_response_bytes: usize,

    pub dispatch: DispatchMode,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            io_timeout_ms: 5_000,
            max_response_bytes: 16 * 1024,
            dispatch: DispatchMode::Inline,
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,

    /// IP address to listen on
    pub listen: String,

    pub port: u16,

    /// Directory of frontend files served for any non-API path
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1".to_string(),
            port: 8565,
            static_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No plugs given; expected <address>:<key>,<address>:<key>")]
    EmptyMapping,

    #[error("Entry '{entry}' is not of the form <address>:<key>")]
    MalformedPair { entry: String, span: Range<usize> },

    #[error("Entry '{entry}' has an empty address")]
    EmptyAddress { entry: String, span: Range<usize> },

    #[error("Entry '{entry}' has an invalid trigger key: {source}")]
    InvalidTriggerKey {
        entry: String,
        span: Range<usize>,
        #[source]
        source: std::num::ParseIntError,
    },
}

impl ConfigError {
    /// Byte range inside the mapping string this error points at, if any
    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            ConfigError::MalformedPair { span, .. }
            | ConfigError::EmptyAddress { span, .. }
            | ConfigError::InvalidTriggerKey { span, .. } => Some(span.clone()),
            _ => None,
        }
    }
}

/// Format a mapping error for display using Ariadne
///
/// Errors without a location are formatted on a single line.
pub fn format_mapping_error(mapping: &str, error: &ConfigError) -> String {
    use ariadne::Color;
    use ariadne::IndexType;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let Some(span) = error.span() else {
        return format!("Error: {}\n", error);
    };

    let mut output = Vec::new();
    let written = Report::build(ReportKind::Error, ("mapping", span.clone()))
        .with_config(ariadne::Config::default().with_index_type(IndexType::Byte))
        .with_message("Invalid plug mapping")
        .with_label(
            Label::new(("mapping", span))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .with_note("expected <address>:<key>,<address>:<key>, e.g. 10.0.0.5:49,10.0.0.6:50")
        .finish()
        .write(("mapping", Source::from(mapping)), &mut output);

    if written.is_err() {
        return format!("Error: {}\n", error);
    }

    String::from_utf8_lossy(&output).to_string()
}
