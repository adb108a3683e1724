//! resurrect-proc — find the process behind the daemon's control port.
//!
//! The daemon is assumed single-instance: a port with zero or several
//! owning processes is an error, never a guess.
//!
//! On Linux the lookup reads procfs:
//!
//! ```text
//! <proc>/net/tcp{,6}     LISTEN rows → socket inodes
//! <proc>/<pid>/fd/*      socket:[inode] links → owning pids
//! <proc>/<pid>/stat      field 22 (starttime, clock ticks since boot)
//! <proc>/stat            btime (boot time, unix seconds)
//! ```

pub mod error;
pub mod locator;
pub mod procfs;

pub use error::{ProcError, ProcResult};
pub use locator::{ProcessHandle, ProcessLocator};
pub use procfs::ProcfsLocator;
