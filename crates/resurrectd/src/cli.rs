//! Command-line surface and config resolution.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use resurrect_core::{ConfigError, ResurrectConfig};

#[derive(Parser, Debug)]
#[command(
    name = "resurrectd",
    version,
    about = "Keeps a Clash-compatible proxy daemon alive and restores its proxy selections after restarts"
)]
pub struct Cli {
    #[command(flatten)]
    pub options: Options,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the reconciliation loop until Ctrl-C or SIGTERM.
    Run,
    /// Run a single reconciliation pass and print its report as JSON.
    Once,
    /// Print daemon health, configs and current selections as JSON.
    Status,
    /// Print the resolved configuration as TOML.
    Config,
}

#[derive(Args, Debug, Default)]
pub struct Options {
    /// TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Port of the daemon's control API.
    #[arg(long, global = true)]
    pub clash_api_port: Option<u16>,

    /// Host of the daemon's control API.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bearer token for the control API.
    #[arg(long, global = true)]
    pub secret: Option<String>,

    /// Directory holding the checkpoint file.
    #[arg(long, global = true)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Tick interval, e.g. `30s` or `2m`.
    #[arg(long, global = true)]
    pub interval: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

impl Options {
    /// Load the config file (if any), apply flag overrides, and validate.
    pub fn resolve(&self) -> Result<ResurrectConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ResurrectConfig::from_file(path)?,
            None => ResurrectConfig::default(),
        };

        if let Some(port) = self.clash_api_port {
            config.daemon.port = port;
        }
        if let Some(host) = &self.host {
            config.daemon.host = host.clone();
        }
        if let Some(secret) = &self.secret {
            config.daemon.secret = Some(secret.clone());
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint.dir = dir.clone();
        }
        if let Some(interval) = &self.interval {
            config.watchdog.interval = interval.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("resurrectd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_subcommand_defaults_to_run() {
        let cli = parse(&[]);
        assert_eq!(cli.command, None);

        let config = cli.options.resolve().unwrap();
        assert_eq!(config.daemon.port, 9090);
        assert_eq!(config.watchdog.interval().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "once",
            "--clash-api-port",
            "9191",
            "--checkpoint-dir",
            "/var/lib/resurrect",
            "--interval",
            "30s",
            "--host",
            "::1",
        ]);
        assert_eq!(cli.command, Some(Command::Once));

        let config = cli.options.resolve().unwrap();
        assert_eq!(config.daemon.port, 9191);
        assert_eq!(config.daemon.host, "::1");
        assert_eq!(config.checkpoint.dir, PathBuf::from("/var/lib/resurrect"));
        assert_eq!(config.watchdog.interval().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn flags_override_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("resurrect.toml");
        std::fs::write(
            &path,
            r#"
[daemon]
port = 7777
sentinel = "mihomo"

[watchdog]
interval = "5m"
kill_signal = "term"
"#,
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--clash-api-port",
            "8888",
        ]);
        let config = cli.options.resolve().unwrap();
        assert_eq!(config.daemon.port, 8888);
        assert_eq!(config.daemon.sentinel, "mihomo");
        assert_eq!(config.watchdog.interval().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let cli = parse(&["--interval", "soon"]);
        assert!(cli.options.resolve().is_err());

        let cli = parse(&["--interval", "0s"]);
        assert!(cli.options.resolve().is_err());
    }

    #[test]
    fn zero_port_is_rejected() {
        let cli = parse(&["--clash-api-port", "0"]);
        assert!(matches!(
            cli.options.resolve(),
            Err(ConfigError::Invalid { field: "daemon.port", .. })
        ));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = parse(&["--config", "/nonexistent/resurrect.toml"]);
        assert!(matches!(cli.options.resolve(), Err(ConfigError::Read { .. })));
    }
}
