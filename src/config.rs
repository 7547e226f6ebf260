//! Configuration loader for the wh31e exporter.
//!
//! Values come from, in order of precedence: environment variables (with
//! optional `.env` support provided by the caller), an optional YAML config
//! file, and built-in defaults. Keeping all of it here avoids scattering
//! `env::var` calls through the codebase.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::TimeDelta;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::models::SensorIdentity;
use crate::store::StoreConfig;

/// Config file consulted when no path is given and `WH31E_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "wh31e.conf";

/// Upper bound for any window or skew setting (ten years).
const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Parse an optional setting from `$lookup`, falling back to `$fallback`.
macro_rules! parse_env {
    ($lookup:expr, $var_name:expr, $ty:ty, $fallback:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($fallback)
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the syslog UDP listener binds to.
    pub syslog_host: String,

    /// Port the syslog UDP listener binds to.
    pub syslog_port: u16,

    /// Port the HTTP metrics endpoint binds to.
    pub port: u16,

    /// Sensor id → friendly name.
    pub sensor_names: BTreeMap<i64, String>,

    pub freshness_window_secs: u64,
    pub counting_window_secs: u64,
    pub max_events: usize,

    /// `0` disables the reading timestamp sanity check.
    pub max_reading_skew_secs: u64,
}

/// On-disk config file. Every key is optional and unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    syslog_host: Option<String>,
    syslog_port: Option<u16>,
    port: Option<u16>,
    #[serde(default, deserialize_with = "sensor_names_from_file")]
    sensor_names: BTreeMap<i64, String>,
    freshness_window_secs: Option<u64>,
    counting_window_secs: Option<u64>,
    max_events: Option<usize>,
    max_reading_skew_secs: Option<u64>,
}

/// Sensor table key: a bare YAML integer, or a quoted one as JSON requires.
#[derive(Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum SensorKey {
    Id(i64),
    Text(String),
}

fn sensor_names_from_file<'de, D>(deserializer: D) -> Result<BTreeMap<i64, String>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    HashMap::<SensorKey, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, name)| {
            let id = match key {
                SensorKey::Id(id) => id,
                SensorKey::Text(text) => text.trim().parse().map_err(|_| {
                    D::Error::custom(format!("invalid sensor id '{text}' in sensor_names"))
                })?,
            };
            Ok((id, name))
        })
        .collect()
}

/// Load configuration from an optional file plus environment overrides.
///
/// The file is `path` when given, else `WH31E_CONFIG`, else
/// [`DEFAULT_CONFIG_PATH`] if it exists. An explicitly named file that is
/// missing is an error. The file is YAML; JSON files load as well.
///
/// Environment:
/// - `SYSLOG_HOST` (default `0.0.0.0`), `SYSLOG_PORT` (default 1514)
/// - `METRICS_PORT` (default 8080)
/// - `SENSOR_NAMES` – `id=name` pairs separated by commas; replaces the file table
/// - `FRESHNESS_WINDOW_SECS` (300), `COUNTING_WINDOW_SECS` (3600)
/// - `MAX_EVENTS` (100000), `MAX_READING_SKEW_SECS` (86400, `0` disables)
pub fn load(path: Option<&Path>) -> Result<Config> {
    load_with(path, |var| env::var(var).ok())
}

fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    // ---
    let explicit = path
        .map(Path::to_path_buf)
        .or_else(|| lookup("WH31E_CONFIG").map(PathBuf::from));

    let file = match explicit {
        Some(path) => read_file(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            read_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => FileConfig::default(),
    };

    let sensor_names = match lookup("SENSOR_NAMES") {
        Some(raw) => parse_sensor_names(&raw)?,
        None => file.sensor_names,
    };

    let config = Config {
        syslog_host: lookup("SYSLOG_HOST")
            .or(file.syslog_host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        syslog_port: parse_env!(lookup, "SYSLOG_PORT", u16, file.syslog_port.unwrap_or(1514)),
        port: parse_env!(lookup, "METRICS_PORT", u16, file.port.unwrap_or(8080)),
        sensor_names,
        freshness_window_secs: parse_env!(
            lookup,
            "FRESHNESS_WINDOW_SECS",
            u64,
            file.freshness_window_secs.unwrap_or(300)
        ),
        counting_window_secs: parse_env!(
            lookup,
            "COUNTING_WINDOW_SECS",
            u64,
            file.counting_window_secs.unwrap_or(3600)
        ),
        max_events: parse_env!(lookup, "MAX_EVENTS", usize, file.max_events.unwrap_or(100_000)),
        max_reading_skew_secs: parse_env!(
            lookup,
            "MAX_READING_SKEW_SECS",
            u64,
            file.max_reading_skew_secs.unwrap_or(86_400)
        ),
    };
    config.check()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<FileConfig> {
    // ---
    tracing::info!("loading config from path: {}", path.display());
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Parse `3=attic,4=garage` into an id → name table.
pub fn parse_sensor_names(raw: &str) -> Result<BTreeMap<i64, String>> {
    // ---
    let mut names = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, name) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid SENSOR_NAMES entry '{}': expected id=name", pair))?;
        let id = id
            .trim()
            .parse::<i64>()
            .map_err(|e| anyhow!("Invalid sensor id in SENSOR_NAMES entry '{}': {}", pair, e))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Empty sensor name in SENSOR_NAMES entry '{}'", pair));
        }
        if names.insert(id, name.to_string()).is_some() {
            return Err(anyhow!("Duplicate sensor id {} in SENSOR_NAMES", id));
        }
    }
    Ok(names)
}

impl Config {
    // ---
    fn check(&self) -> Result<()> {
        // ---
        if self.freshness_window_secs == 0 || self.counting_window_secs == 0 {
            return Err(anyhow!("Store windows must be at least one second"));
        }
        let longest = self
            .freshness_window_secs
            .max(self.counting_window_secs)
            .max(self.max_reading_skew_secs);
        if longest > MAX_WINDOW_SECS {
            return Err(anyhow!(
                "Window and skew settings must not exceed {} seconds",
                MAX_WINDOW_SECS
            ));
        }
        if self.max_events == 0 {
            return Err(anyhow!("MAX_EVENTS must be at least 1"));
        }
        Ok(())
    }

    pub fn identity(&self) -> SensorIdentity {
        SensorIdentity::new(self.sensor_names.clone())
    }

    pub fn store_config(&self) -> StoreConfig {
        // ---
        let secs = |s: u64| TimeDelta::seconds(s.min(MAX_WINDOW_SECS) as i64);
        StoreConfig {
            freshness_window: secs(self.freshness_window_secs),
            counting_window: secs(self.counting_window_secs),
            max_events: self.max_events,
            max_reading_skew: (self.max_reading_skew_secs > 0)
                .then(|| secs(self.max_reading_skew_secs)),
        }
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SYSLOG_HOST           : {}", self.syslog_host);
        tracing::info!("  SYSLOG_PORT           : {}", self.syslog_port);
        tracing::info!("  METRICS_PORT          : {}", self.port);
        tracing::info!("  FRESHNESS_WINDOW_SECS : {}", self.freshness_window_secs);
        tracing::info!("  COUNTING_WINDOW_SECS  : {}", self.counting_window_secs);
        tracing::info!("  MAX_EVENTS            : {}", self.max_events);
        tracing::info!("  MAX_READING_SKEW_SECS : {}", self.max_reading_skew_secs);
        for (id, name) in &self.sensor_names {
            tracing::info!("  sensor {:>6}         : {}", id, name);
        }
    }
}
