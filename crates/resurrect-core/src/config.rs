//! resurrect.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a usable config. Durations are kept as strings in the file and parsed
//! on access.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResurrectConfig {
    pub daemon: DaemonConfig,
    pub checkpoint: CheckpointConfig,
    pub watchdog: WatchdogConfig,
}

/// Where and how to reach the proxy daemon's control API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for the control API, if the daemon sets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Expected value of `hello` on `GET /`.
    pub sentinel: String,
    /// Deadline applied to every control-API request.
    pub timeout: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
            secret: None,
            sentinel: "clash".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("daemon.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/clash-resurrect/"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Time between reconciliation passes.
    pub interval: String,
    /// Consecutive failed probes before the daemon is killed.
    pub unhealthy_threshold: u32,
    pub kill_signal: KillSignal,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            unhealthy_threshold: 1,
            kill_signal: KillSignal::Kill,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        duration_field("watchdog.interval", &self.interval)
    }
}

/// Signal sent to an unresponsive daemon.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KillSignal {
    /// SIGKILL; cannot be ignored by a wedged process.
    #[default]
    Kill,
    /// SIGTERM; lets the daemon shut down cleanly if it still can.
    Term,
}

impl ResurrectConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the watchdog cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.port == 0 {
            return Err(ConfigError::Invalid {
                field: "daemon.port",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.daemon.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "daemon.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.daemon.timeout()?.is_zero() {
            return Err(ConfigError::Invalid {
                field: "daemon.timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.watchdog.interval()?.is_zero() {
            return Err(ConfigError::Invalid {
                field: "watchdog.interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.watchdog.unhealthy_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.unhealthy_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.checkpoint.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "checkpoint.dir",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daemon_conventions() {
        let config = ResurrectConfig::default();
        assert_eq!(config.daemon.port, 9090);
        assert_eq!(config.daemon.sentinel, "clash");
        assert_eq!(config.checkpoint.dir, PathBuf::from("/tmp/clash-resurrect/"));
        assert_eq!(config.watchdog.interval().unwrap(), Duration::from_secs(60));
        assert_eq!(config.watchdog.unhealthy_threshold, 1);
        assert_eq!(config.watchdog.kill_signal, KillSignal::Kill);
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_file_is_default() {
        let config = ResurrectConfig::from_toml_str("").unwrap();
        assert_eq!(config, ResurrectConfig::default());
    }

    #[test]
    fn parse_partial_tables() {
        let toml_str = r#"
[daemon]
port = 9191
secret = "s3cret"
timeout = "1500ms"

[watchdog]
interval = "30s"
kill_signal = "term"
"#;
        let config = ResurrectConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.daemon.port, 9191);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.daemon.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.daemon.timeout().unwrap(), Duration::from_millis(1500));
        assert_eq!(config.watchdog.interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.watchdog.kill_signal, KillSignal::Term);
    }

    #[test]
    fn unknown_kill_signal_is_rejected() {
        let err = ResurrectConfig::from_toml_str("[watchdog]\nkill_signal = \"hup\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let mut config = ResurrectConfig::default();
        config.watchdog.interval = "often".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "watchdog.interval", .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = ResurrectConfig::default();
        config.daemon.port = 0;
        assert!(config.validate().is_err());

        let mut config = ResurrectConfig::default();
        config.watchdog.unhealthy_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = ResurrectConfig::default();
        config.watchdog.interval = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn render_then_parse() {
        let mut config = ResurrectConfig::default();
        config.daemon.secret = Some("token".to_string());
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[daemon]"));
        assert_eq!(ResurrectConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResurrectConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resurrect.toml");
        std::fs::write(&path, "[checkpoint]\ndir = \"/var/lib/resurrect\"\n").unwrap();
        let config = ResurrectConfig::from_file(&path).unwrap();
        assert_eq!(config.checkpoint.dir, PathBuf::from("/var/lib/resurrect"));
    }
}
