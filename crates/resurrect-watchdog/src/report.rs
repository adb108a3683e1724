//! What a single reconciliation pass did.

use serde::Serialize;

use crate::tracker::DaemonHealth;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub health: DaemonHealth,
    /// Pid that was signalled by the kill path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed: Option<u32>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// No restart since the last checkpoint; live selections were saved.
    Steady { groups: usize, saved: bool },
    /// Restart presumed; checkpointed Selector groups were replayed.
    Restored {
        applied: Vec<String>,
        failed: Vec<String>,
        saved: bool,
    },
    /// The pass stopped before the decision step.
    Skipped { reason: SkipReason, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `GET /proxies` failed; nothing to reconcile.
    ProxiesUnavailable,
    /// The daemon's pid or start time could not be determined.
    OwnerUnknown,
}

impl IterationReport {
    /// Whether the checkpoint file was rewritten during the pass.
    pub fn saved(&self) -> bool {
        match self.outcome {
            Outcome::Steady { saved, .. } | Outcome::Restored { saved, .. } => saved,
            Outcome::Skipped { .. } => false,
        }
    }
}
