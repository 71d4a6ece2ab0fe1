//! Configuration for Idlewatch
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags (or their `IDLEWATCH_*` environment variables).
//! Every field has a default so an empty file is a valid config.

mod duration;

pub use duration::{format_duration, parse_duration};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IdlewatchError, Result};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "idlewatch.toml";

/// Lines that mean a client is actually streaming or browsing
pub const DEFAULT_ACTIVITY_SIGNATURES: &[&str] = &[
    r"-> GET /manifest\.json",
    r"-> GET /stream/",
    r"-> (?:GET|HEAD) /hlsv2/",
    r"HTTP request: (?:GET|HEAD|POST) /(?:stream|hlsv2|subtitles|[0-9a-f]{40})",
];

/// Lines produced by health checks and keep-alive polling
pub const DEFAULT_IDLE_SIGNATURES: &[&str] = &[
    r"(?:->|HTTP request:) (?:GET|HEAD) /(?:\s|$)",
    r"(?:->|HTTP request:) (?:GET|HEAD) /(?:health|healthz|heartbeat|settings|network-info|device-info)\b",
];

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Name of the container to watch
    pub container_name: String,

    /// Continuous inactivity required before stopping
    #[serde(with = "duration::serde_duration")]
    pub inactivity_threshold: Duration,

    /// Time between ticks (also the log window length)
    #[serde(with = "duration::serde_duration")]
    pub poll_interval: Duration,

    /// Regexes marking real work
    pub activity_signatures: Vec<String>,

    /// Regexes marking idle / no-op traffic
    pub idle_signatures: Vec<String>,

    /// Directory whose contents are wiped after a stop. Unset disables cleanup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_target: Option<PathBuf>,

    pub runtime: RuntimeConfig,
}

/// How to reach the container runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Daemon address: `unix:///path/to.sock` or `tcp://host:port`.
    /// Unset uses `DOCKER_HOST` or the local socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Upper bound for every runtime call
    #[serde(with = "duration::serde_duration")]
    pub timeout: Duration,

    /// Grace period given to the container on stop
    #[serde(with = "duration::serde_duration")]
    pub stop_grace: Duration,

    /// Maximum log lines fetched per tick
    pub log_tail: usize,

    /// Resolve the first container whose name contains `container_name`
    pub match_substring: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container_name: "stremio_server".to_string(),
            inactivity_threshold: Duration::from_secs(15 * 60),
            poll_interval: Duration::from_secs(60),
            activity_signatures: DEFAULT_ACTIVITY_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            idle_signatures: DEFAULT_IDLE_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_target: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            log_tail: 1000,
            match_substring: false,
        }
    }
}

impl Config {
    /// Load from `path`, or from `idlewatch.toml` in the working directory
    /// if present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IdlewatchError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(IdlewatchError::ConfigError(
                "container_name must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(IdlewatchError::ConfigError(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.inactivity_threshold.is_zero() {
            return Err(IdlewatchError::ConfigError(
                "inactivity_threshold must be greater than zero".to_string(),
            ));
        }
        if self.runtime.log_tail == 0 {
            return Err(IdlewatchError::ConfigError(
                "runtime.log_tail must be greater than zero".to_string(),
            ));
        }
        if matches!(self.runtime.host, Some(ref h) if h.trim().is_empty()) {
            return Err(IdlewatchError::ConfigError(
                "runtime.host must not be empty when set".to_string(),
            ));
        }
        for pattern in self.activity_signatures.iter().chain(&self.idle_signatures) {
            Regex::new(pattern)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            container_name = "media"
            inactivity_threshold = "30m"
            poll_interval = 90
            activity_signatures = ["GET /play/"]
            idle_signatures = ["GET /ping"]
            cache_target = "/srv/media/cache"

            [runtime]
            host = "tcp://10.0.0.5:2375"
            timeout = "10s"
            log_tail = 200
            match_substring = true
            "#,
        )
        .unwrap();

        assert_eq!(config.container_name, "media");
        assert_eq!(config.inactivity_threshold, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Duration::from_secs(90));
        assert_eq!(config.activity_signatures, vec!["GET /play/"]);
        assert_eq!(config.cache_target, Some(PathBuf::from("/srv/media/cache")));
        assert_eq!(config.runtime.host.as_deref(), Some("tcp://10.0.0.5:2375"));
        assert_eq!(config.runtime.timeout, Duration::from_secs(10));
        assert_eq!(config.runtime.stop_grace, Duration::from_secs(10));
        assert_eq!(config.runtime.log_tail, 200);
        assert!(config.runtime.match_substring);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("container = \"x\"").is_err());
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(Config::from_toml("poll_interval = \"soon\"").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            poll_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IdlewatchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let config = Config {
            idle_signatures: vec!["(unclosed".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IdlewatchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "container_name = \"from-file\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.container_name, "from-file");
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let result = Config::load(Some(Path::new("/nonexistent/idlewatch.toml")));
        assert!(matches!(result, Err(IdlewatchError::ConfigError(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
