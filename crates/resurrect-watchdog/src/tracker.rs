//! Health probe bookkeeping.
//!
//! Tracks consecutive probe failures and decides when the daemon counts
//! as unhealthy (and so becomes eligible for the kill path).

use serde::Serialize;
use tracing::{info, warn};

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// `GET /` answered with the expected sentinel.
    Healthy,
    /// The daemon answered, but not with the expected sentinel.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

/// Health of the watched daemon as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
pub struct HealthTracker {
    status: DaemonHealth,
    consecutive_failures: u32,
    /// Failures needed before the daemon is marked unhealthy.
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            status: DaemonHealth::Unknown,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Record a probe result and return the new health status.
    pub fn record(&mut self, result: ProbeResult) -> DaemonHealth {
        match result {
            ProbeResult::Healthy => {
                if self.status == DaemonHealth::Unhealthy {
                    info!(
                        failures = self.consecutive_failures,
                        "daemon recovered to healthy"
                    );
                }
                self.consecutive_failures = 0;
                self.status = DaemonHealth::Healthy;
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != DaemonHealth::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "daemon marked unhealthy"
                        );
                    }
                    self.status = DaemonHealth::Unhealthy;
                }
            }
        }

        self.status
    }

    pub fn status(&self) -> DaemonHealth {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the last recorded probe leaves the daemon unhealthy.
    pub fn needs_kill(&self) -> bool {
        self.status == DaemonHealth::Unhealthy
    }
}
