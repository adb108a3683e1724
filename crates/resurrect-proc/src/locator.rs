//! The `ProcessLocator` seam used by the watchdog.

use std::time::SystemTime;

use resurrect_core::KillSignal;

use crate::error::ProcResult;

/// Identity and age of the process owning the control port.
///
/// Derived fresh on every pass; a cached handle would outlive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub started_at: SystemTime,
}

pub trait ProcessLocator: Send + Sync {
    /// The unique pid listening on `port`.
    ///
    /// Fails with `AmbiguousOwner` when there are zero or several.
    fn find_owner(&self, port: u16) -> ProcResult<u32>;

    /// When `pid` was started.
    fn start_time(&self, pid: u32) -> ProcResult<SystemTime>;

    /// Send `signal` to `pid`.
    fn terminate(&self, pid: u32, signal: KillSignal) -> ProcResult<()>;

    /// `find_owner` followed by `start_time`.
    fn locate(&self, port: u16) -> ProcResult<ProcessHandle> {
        let pid = self.find_owner(port)?;
        let started_at = self.start_time(pid)?;
        Ok(ProcessHandle { pid, started_at })
    }
}
