//! Relay settings, optional config file and CLI overrides.
//!
//! Settings come from three layers, last one wins: built-in defaults from
//! `sockrelay_core::defaults`, an optional TOML file passed with `--config`,
//! and command-line flags. Example file:
//!
//! ```toml
//! [relay]
//! buffer_size = 32768
//! health_check_interval = "10s"
//! io_timeout = "1m"
//! max_connections = 256
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use sockrelay_core::defaults::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
    DEFAULT_IO_TIMEOUT_SECS, MAX_BUFFER_SIZE, MAX_DURATION_SECS,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("validation: {0}")]
    Validation(String),
}

/// Tunables shared by every relay direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Bytes per copy chunk.
    pub buffer_size: usize,
    /// Interval between source reachability probes.
    #[serde(with = "duration_str")]
    pub health_check_interval: Duration,
    /// Read and write deadline applied to every relayed I/O call.
    #[serde(with = "duration_str")]
    pub io_timeout: Duration,
    /// How long to wait for active pairings once the accept loop stops.
    #[serde(with = "duration_str")]
    pub drain_timeout: Duration,
    /// Optional cap on concurrent pairings (None = unlimited).
    pub max_connections: Option<usize>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            max_connections: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Log format: json, pretty, or compact. Default: pretty.
    pub format: Option<String>,
}

/// Top-level layout of the optional config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayFile {
    pub relay: RelaySettings,
    pub logging: LoggingConfig,
}

/// Flags that override file or default settings.
#[derive(Debug, Clone, Default, Args)]
pub struct RelayOverrides {
    /// Buffer size in bytes of the data stream [default: 16384]
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Health check interval for `src`, e.g. 30s, 5m, 1h [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub health_check_interval: Option<Duration>,
    /// Read/write deadline for relayed connections, e.g. 30s [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub io_timeout: Option<Duration>,
    /// Maximum concurrent pairings (0 = unlimited)
    #[arg(long)]
    pub max_connections: Option<usize>,
    /// Log level override (e.g. "info", "debug", "trace")
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
    /// Log format (pretty, compact, json)
    #[arg(long)]
    pub log_format: Option<String>,
}

/// Load a config file. Only TOML is supported.
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayFile, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&data)?)
}

/// Apply command-line overrides on top of loaded settings.
pub fn apply_overrides(file: &mut RelayFile, overrides: &RelayOverrides) {
    let relay = &mut file.relay;
    if let Some(v) = overrides.buffer_size {
        relay.buffer_size = v;
    }
    if let Some(v) = overrides.health_check_interval {
        relay.health_check_interval = v;
    }
    if let Some(v) = overrides.io_timeout {
        relay.io_timeout = v;
    }
    if let Some(v) = overrides.max_connections {
        relay.max_connections = Some(v);
    }
    // 0 means unlimited
    if relay.max_connections == Some(0) {
        relay.max_connections = None;
    }
    if let Some(v) = &overrides.log_level {
        file.logging.level = Some(v.to_ascii_lowercase());
    }
    if let Some(v) = &overrides.log_format {
        file.logging.format = Some(v.clone());
    }
}

/// Check settings before any socket is touched.
pub fn validate_settings(settings: &RelaySettings) -> Result<(), ConfigError> {
    if settings.buffer_size == 0 || settings.buffer_size > MAX_BUFFER_SIZE {
        return Err(ConfigError::Validation(format!(
            "buffer_size must be between 1 and {MAX_BUFFER_SIZE} bytes, got {}",
            settings.buffer_size
        )));
    }
    check_duration("health_check_interval", settings.health_check_interval, false)?;
    check_duration("io_timeout", settings.io_timeout, false)?;
    check_duration("drain_timeout", settings.drain_timeout, true)?;
    Ok(())
}

fn check_duration(name: &str, value: Duration, allow_zero: bool) -> Result<(), ConfigError> {
    if value.is_zero() && !allow_zero {
        return Err(ConfigError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }
    if value > Duration::from_secs(MAX_DURATION_SECS) {
        return Err(ConfigError::Validation(format!(
            "{name} must not exceed {}, got {}",
            format_duration(Duration::from_secs(MAX_DURATION_SECS)),
            format_duration(value)
        )));
    }
    Ok(())
}

/// Map a log level to an `EnvFilter` directive.
///
/// `fatal` and `panic` have no tracing equivalent and are treated as `error`.
/// Anything containing `=` or `,` is passed through as a filter directive;
/// other unknown words are rejected.
pub fn normalize_log_level(level: &str) -> Result<String, ConfigError> {
    let level = level.trim().to_ascii_lowercase();
    if level.contains('=') || level.contains(',') {
        return Ok(level);
    }
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(level),
        "warning" => Ok("warn".into()),
        "fatal" | "panic" => Ok("error".into()),
        other => Err(ConfigError::Validation(format!(
            "unknown log level {other:?}, expected one of trace, debug, info, warn, error"
        ))),
    }
}

/// Resolve the effective file + overrides, validating the result.
pub fn resolve_settings(
    config: Option<&Path>,
    overrides: &RelayOverrides,
) -> Result<RelayFile, ConfigError> {
    let mut file = match config {
        Some(path) => load_config(path)?,
        None => RelayFile::default(),
    };
    apply_overrides(&mut file, overrides);
    validate_settings(&file.relay)?;
    if let Some(level) = file.logging.level.take() {
        file.logging.level = Some(normalize_log_level(&level)?);
    }
    Ok(file)
}

/// Parse a duration such as `30s`, `5m`, `1h30m`, `250ms` or `1.5s`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration {input:?}: expected a number"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}: bad number"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("invalid duration {input:?}: missing unit")),
            unit => return Err(format!("invalid duration {input:?}: unknown unit {unit:?}")),
        };
        rest = &rest[unit_len..];

        let segment = Duration::try_from_secs_f64(value * scale)
            .map_err(|_| format!("invalid duration {input:?}: out of range"))?;
        total = total
            .checked_add(segment)
            .ok_or_else(|| format!("invalid duration {input:?}: out of range"))?;
    }
    Ok(total)
}

/// Render a duration in the shortest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() != 0 {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
