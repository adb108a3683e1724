//! resurrect-watchdog — the reconciliation loop.
//!
//! Every tick runs one pass, in strict order:
//!
//! ```text
//! probe_health ──fail──▶ find_owner → terminate        (never fatal)
//!      │
//! list_proxies ──fail──▶ skip pass
//!      │
//! load checkpoint (never fails)
//!      │
//! find_owner → start_time ──fail──▶ skip pass
//!      │
//! started_at <  saved_at ──▶ save live snapshot
//! started_at >= saved_at ──▶ replay Selector groups, save checkpoint again
//! ```
//!
//! Comparing a process start time against a file mtime is racy under
//! clock skew or coarse timestamps; the comparison is kept as is, ties
//! counting as a restart.
//!
//! No error raised inside a pass stops the loop. The loop ends only when
//! the shutdown channel fires.

pub mod reconciler;
pub mod report;
pub mod tracker;

pub use reconciler::{Decision, Reconciler, ReconcilerSettings, decide};
pub use report::{IterationReport, Outcome, SkipReason};
pub use tracker::{DaemonHealth, HealthTracker, ProbeResult};
