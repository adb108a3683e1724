//! resurrect-core — shared types and configuration for clash-resurrect.
//!
//! Holds the typed shapes of the proxy daemon's control API (root,
//! `/proxies`, `/configs`), the TOML configuration consumed by the
//! watchdog, and the duration parser used for intervals and timeouts.

pub mod config;
pub mod duration;
pub mod types;

pub use config::{
    CheckpointConfig, ConfigError, DaemonConfig, KillSignal, ResurrectConfig, WatchdogConfig,
};
pub use duration::{format_duration, parse_duration};
pub use types::*;
