//! Reconciler: one pass per tick over health, kill, checkpoint and
//! restore.

use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use resurrect_checkpoint::{Checkpoint, CheckpointStore};
use resurrect_client::ControlApi;
use resurrect_core::{KillSignal, ProxySnapshot, ResurrectConfig};
use resurrect_proc::ProcessLocator;

use crate::report::{IterationReport, Outcome, SkipReason};
use crate::tracker::{DaemonHealth, HealthTracker, ProbeResult};

/// What to do with the checkpoint once the daemon's age is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The daemon predates the checkpoint: live selections are authoritative.
    Persist,
    /// The daemon started at or after the checkpoint: replay it.
    Restore,
}

/// Compare the daemon's start time against the checkpoint's save time.
pub fn decide(daemon_started: SystemTime, checkpoint_saved: SystemTime) -> Decision {
    if daemon_started < checkpoint_saved {
        Decision::Persist
    } else {
        Decision::Restore
    }
}

/// Loop inputs fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Control-API port; its owner is the daemon.
    pub port: u16,
    pub kill_signal: KillSignal,
    pub unhealthy_threshold: u32,
}

impl ReconcilerSettings {
    pub fn from_config(config: &ResurrectConfig) -> Self {
        Self {
            port: config.daemon.port,
            kill_signal: config.watchdog.kill_signal,
            unhealthy_threshold: config.watchdog.unhealthy_threshold,
        }
    }
}

/// Drives reconciliation passes against one daemon and one checkpoint
/// directory.
pub struct Reconciler<C, L> {
    client: C,
    locator: L,
    store: CheckpointStore,
    settings: ReconcilerSettings,
    tracker: HealthTracker,
}

impl<C: ControlApi, L: ProcessLocator> Reconciler<C, L> {
    pub fn new(client: C, locator: L, store: CheckpointStore, settings: ReconcilerSettings) -> Self {
        Self {
            client,
            locator,
            store,
            tracker: HealthTracker::new(settings.unhealthy_threshold),
            settings,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn health(&self) -> DaemonHealth {
        self.tracker.status()
    }

    /// Run passes every `interval` until `shutdown` fires.
    ///
    /// The first pass runs immediately. A pass in progress is never
    /// interrupted; shutdown is observed between passes.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            port = self.settings.port,
            interval_ms = interval.as_millis() as u64,
            dir = %self.store.dir().display(),
            "watchdog started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    debug!(?report, "reconciliation pass complete");
                }
                _ = shutdown.changed() => {
                    info!("watchdog shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass. Never fails; every error is logged and
    /// folded into the report.
    pub async fn run_once(&mut self) -> IterationReport {
        let (health, killed) = self.check_health().await;

        let live = match self.client.list_proxies().await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "cannot list proxies, skipping pass");
                return IterationReport {
                    health,
                    killed,
                    outcome: Outcome::Skipped {
                        reason: SkipReason::ProxiesUnavailable,
                        detail: e.to_string(),
                    },
                };
            }
        };

        let checkpoint = self.store.load();

        let daemon = match self.locator.locate(self.settings.port) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(port = self.settings.port, error = %e, "cannot identify daemon, skipping pass");
                return IterationReport {
                    health,
                    killed,
                    outcome: Outcome::Skipped {
                        reason: SkipReason::OwnerUnknown,
                        detail: e.to_string(),
                    },
                };
            }
        };

        let outcome = match decide(daemon.started_at, checkpoint.saved_at) {
            Decision::Persist => {
                let saved = self.persist(&live);
                Outcome::Steady {
                    groups: live.len(),
                    saved,
                }
            }
            Decision::Restore => {
                info!(
                    pid = daemon.pid,
                    groups = checkpoint.proxies.len(),
                    "daemon started after last checkpoint, restoring selections"
                );
                self.restore(checkpoint).await
            }
        };

        IterationReport {
            health,
            killed,
            outcome,
        }
    }

    /// Probe the daemon; kill it if the tracker says it is unhealthy.
    async fn check_health(&mut self) -> (DaemonHealth, Option<u32>) {
        let result = match self.client.probe_health().await {
            Ok(()) => ProbeResult::Healthy,
            Err(e) => {
                warn!(error = %e, "health probe failed");
                if e.is_unreachable() {
                    ProbeResult::Failed
                } else {
                    ProbeResult::Unhealthy
                }
            }
        };

        let health = self.tracker.record(result);
        if result == ProbeResult::Healthy || !self.tracker.needs_kill() {
            return (health, None);
        }
        (health, self.kill_daemon())
    }

    fn kill_daemon(&self) -> Option<u32> {
        let port = self.settings.port;
        let pid = match self.locator.find_owner(port) {
            Ok(pid) => pid,
            Err(e) => {
                warn!(port, error = %e, "cannot identify daemon to kill");
                return None;
            }
        };

        match self.locator.terminate(pid, self.settings.kill_signal) {
            Ok(()) => {
                warn!(pid, signal = ?self.settings.kill_signal, "killed unresponsive daemon");
                Some(pid)
            }
            Err(e) => {
                warn!(pid, error = %e, "failed to kill daemon");
                None
            }
        }
    }

    /// Replay every Selector group of `checkpoint`, then re-save it so its
    /// timestamp moves past the daemon's start time.
    async fn restore(&self, checkpoint: Checkpoint) -> Outcome {
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for (group, child) in checkpoint.proxies.selector_selections() {
            match self.client.set_selection(group, child).await {
                Ok(()) => {
                    debug!(%group, %child, "selection restored");
                    applied.push(group.to_string());
                }
                Err(e) => {
                    warn!(%group, %child, error = %e, "failed to restore selection");
                    failed.push(group.to_string());
                }
            }
        }

        let saved = self.persist(&checkpoint.proxies);
        info!(
            applied = applied.len(),
            failed = failed.len(),
            "selections replayed"
        );

        Outcome::Restored {
            applied,
            failed,
            saved,
        }
    }

    fn persist(&self, proxies: &ProxySnapshot) -> bool {
        match self.store.save(proxies) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "checkpoint write failed");
                false
            }
        }
    }
}
