//! procfs-backed `ProcessLocator`.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use resurrect_core::KillSignal;

use crate::error::{ProcError, ProcResult};
use crate::locator::ProcessLocator;

/// `st` column value for a listening socket.
const TCP_LISTEN: &str = "0A";

/// Socket tables scanned for listeners.
const SOCKET_TABLES: [&str; 2] = ["net/tcp", "net/tcp6"];

/// Locates processes by reading a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcfsLocator {
    root: PathBuf,
    /// `sysconf(_SC_CLK_TCK)`; unit of the starttime field.
    clock_ticks: u64,
}

impl Default for ProcfsLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsLocator {
    /// Locator for the host's `/proc`.
    pub fn new() -> Self {
        Self::with_root("/proc", clock_ticks_per_sec())
    }

    /// Locator for a procfs tree mounted elsewhere (or faked in tests).
    pub fn with_root(root: impl Into<PathBuf>, clock_ticks: u64) -> Self {
        Self {
            root: root.into(),
            clock_ticks: clock_ticks.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inodes of sockets listening on `port`, across IPv4 and IPv6.
    fn listening_inodes(&self, port: u16) -> ProcResult<HashSet<u64>> {
        let mut inodes = HashSet::new();
        let mut tables_read = 0;

        for table in SOCKET_TABLES {
            let path = self.root.join(table);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                // tcp6 is absent when IPv6 is disabled.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(ProcError::Io { path, source }),
            };
            tables_read += 1;
            inodes.extend(parse_listening_inodes(&content, port));
        }

        if tables_read == 0 {
            return Err(ProcError::Unsupported(format!(
                "no socket tables under {}",
                self.root.display()
            )));
        }
        Ok(inodes)
    }

    /// Pids holding a descriptor for any of `inodes`.
    fn owners_of(&self, inodes: &HashSet<u64>) -> ProcResult<BTreeSet<u32>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| ProcError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut owners = BTreeSet::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Other users' fd tables are unreadable without privileges, and
            // processes may exit mid-scan; both just mean "not ours".
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            for fd in fds.flatten() {
                let Ok(target) = std::fs::read_link(fd.path()) else {
                    continue;
                };
                if let Some(inode) = target.to_str().and_then(parse_socket_link) {
                    if inodes.contains(&inode) {
                        owners.insert(pid);
                        break;
                    }
                }
            }
        }
        Ok(owners)
    }

    fn boot_time(&self) -> ProcResult<u64> {
        let path = self.root.join("stat");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProcError::Unsupported(format!(
                    "{} not found",
                    path.display()
                )));
            }
            Err(source) => return Err(ProcError::Io { path, source }),
        };
        parse_boot_time(&content).ok_or_else(|| ProcError::Parse {
            path,
            reason: "missing btime".to_string(),
        })
    }
}

impl ProcessLocator for ProcfsLocator {
    fn find_owner(&self, port: u16) -> ProcResult<u32> {
        let inodes = self.listening_inodes(port)?;
        let owners = if inodes.is_empty() {
            BTreeSet::new()
        } else {
            self.owners_of(&inodes)?
        };
        debug!(port, sockets = inodes.len(), ?owners, "resolved port owners");

        let mut iter = owners.iter();
        match (iter.next(), iter.next()) {
            (Some(&pid), None) => Ok(pid),
            _ => Err(ProcError::AmbiguousOwner {
                port,
                owners: owners.into_iter().collect(),
            }),
        }
    }

    fn start_time(&self, pid: u32) -> ProcResult<SystemTime> {
        let path = self.root.join(pid.to_string()).join("stat");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ProcError::ProcessGone(pid)),
            Err(source) => return Err(ProcError::Io { path, source }),
        };
        let ticks = parse_start_ticks(&content).ok_or_else(|| ProcError::Parse {
            path: path.clone(),
            reason: "missing starttime field".to_string(),
        })?;
        let btime = self.boot_time()?;

        let since_boot = Duration::from_millis(ticks.saturating_mul(1000) / self.clock_ticks);
        Ok(UNIX_EPOCH + Duration::from_secs(btime) + since_boot)
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32, signal: KillSignal) -> ProcResult<()> {
        // pid 0 and negative pids address process groups, never one daemon.
        let target = match libc::pid_t::try_from(pid) {
            Ok(target) if target > 0 => target,
            _ => return Err(ProcError::PermissionDenied(pid)),
        };
        let signo = match signal {
            KillSignal::Kill => libc::SIGKILL,
            KillSignal::Term => libc::SIGTERM,
        };

        // SAFETY: kill(2) takes plain integers and touches no memory.
        let rc = unsafe { libc::kill(target, signo) };
        if rc == 0 {
            debug!(pid, ?signal, "signal delivered");
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(ProcError::ProcessGone(pid)),
            Some(libc::EPERM) => Err(ProcError::PermissionDenied(pid)),
            _ => Err(ProcError::Io {
                path: self.root.join(pid.to_string()),
                source: err,
            }),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _pid: u32, _signal: KillSignal) -> ProcResult<()> {
        Err(ProcError::Unsupported("signals require a unix platform".to_string()))
    }
}

/// Ticks per second of the starttime field.
pub fn clock_ticks_per_sec() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf only reads a configuration value.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 {
            return ticks as u64;
        }
    }
    100
}

/// Inodes of LISTEN rows bound to `port` in a `/proc/net/tcp{,6}` table.
fn parse_listening_inodes(table: &str, port: u16) -> Vec<u64> {
    table
        .lines()
        .skip(1) // header
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, hex_port) = fields[1].rsplit_once(':')?;
            if u16::from_str_radix(hex_port, 16).ok()? != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|&inode| inode != 0)
        })
        .collect()
}

/// `socket:[12345]` → 12345.
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Field 22 of `/proc/<pid>/stat`.
///
/// The comm field may itself contain spaces and parentheses, so fields
/// are counted from the last `)`.
fn parse_start_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    // rest starts at field 3 (state); starttime is field 22.
    rest.split_whitespace().nth(22 - 3)?.parse().ok()
}

fn parse_boot_time(stat: &str) -> Option<u64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}
