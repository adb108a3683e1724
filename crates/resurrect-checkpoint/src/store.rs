//! `CheckpointStore`: a single JSON snapshot file in a directory.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use resurrect_core::ProxySnapshot;

use crate::error::{CheckpointError, CheckpointResult};

/// File name of the checkpoint inside its directory.
pub const CHECKPOINT_FILE: &str = "proxies.json";

/// Written first, then renamed over `CHECKPOINT_FILE`.
const TEMP_FILE: &str = "proxies.json.tmp";

/// A loaded (or freshly written) checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// The daemon's proxy document as it was saved.
    pub proxies: ProxySnapshot,
    /// Modification time of the file; `now` for an empty checkpoint.
    pub saved_at: SystemTime,
}

impl Checkpoint {
    /// The clean slate: no selections, stamped now.
    pub fn empty() -> Self {
        Self {
            proxies: ProxySnapshot::default(),
            saved_at: SystemTime::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// `group → selected child` for every saved entry with a selection.
    pub fn selections(&self) -> BTreeMap<String, String> {
        self.proxies.selections()
    }
}

/// Owns the checkpoint file of one directory. The watchdog is its only
/// writer, so no locking is done.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open the store, creating `dir` (mode 0750) if it does not exist.
    ///
    /// Fails if `dir` exists but is not a directory, or cannot be read.
    pub fn open(dir: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let dir = dir.into();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CheckpointError::NotADirectory(dir)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                create_dir(&dir).map_err(|source| CheckpointError::Io {
                    path: dir.clone(),
                    source,
                })?;
                debug!(dir = %dir.display(), "created checkpoint directory");
            }
            Err(source) => return Err(CheckpointError::Io { path: dir, source }),
        }

        fs::read_dir(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the checkpoint file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Load the checkpoint, falling back to [`Checkpoint::empty`] on any error.
    pub fn load(&self) -> Checkpoint {
        match self.try_load() {
            Ok(checkpoint) => {
                debug!(
                    groups = checkpoint.proxies.len(),
                    path = %self.path().display(),
                    "checkpoint loaded"
                );
                checkpoint
            }
            Err(CheckpointError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path().display(), "no checkpoint yet, starting clean");
                Checkpoint::empty()
            }
            Err(e) => {
                warn!(error = %e, "discarding unusable checkpoint");
                Checkpoint::empty()
            }
        }
    }

    /// Load the checkpoint, surfacing why it could not be used.
    pub fn try_load(&self) -> CheckpointResult<Checkpoint> {
        let path = self.path();
        let io_err = |source| CheckpointError::Io {
            path: path.clone(),
            source,
        };

        let meta = fs::metadata(&path).map_err(io_err)?;
        let bytes = fs::read(&path).map_err(io_err)?;
        let proxies: ProxySnapshot =
            serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let saved_at = meta.modified().map_err(io_err)?;

        Ok(Checkpoint { proxies, saved_at })
    }

    /// Atomically replace the checkpoint with `proxies`.
    ///
    /// Returns the checkpoint as now stored, stamped with the new file's
    /// modification time.
    pub fn save(&self, proxies: &ProxySnapshot) -> CheckpointResult<Checkpoint> {
        let bytes = serde_json::to_vec_pretty(proxies)
            .map_err(|e| CheckpointError::Serialize(e.to_string()))?;

        let tmp = self.dir.join(TEMP_FILE);
        if let Err(source) = write_synced(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(CheckpointError::Io { path: tmp, source });
        }

        let path = self.path();
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(CheckpointError::Io { path, source });
        }

        let saved_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(groups = proxies.len(), path = %path.display(), "checkpoint saved");

        Ok(Checkpoint {
            proxies: proxies.clone(),
            saved_at,
        })
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o750).create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use resurrect_core::ProxyGroup;

    use super::*;

    fn snapshot(entries: &[(&str, &str, &[&str], &str)]) -> ProxySnapshot {
        ProxySnapshot {
            proxies: entries
                .iter()
                .map(|(name, kind, members, current)| {
                    (
                        name.to_string(),
                        ProxyGroup {
                            kind: kind.to_string(),
                            members: members.iter().map(|m| m.to_string()).collect(),
                            current: current.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// mtime granularity varies by filesystem; allow some slack.
    fn not_before(t: SystemTime, reference: SystemTime) -> bool {
        t + Duration::from_secs(2) >= reference
    }

    #[test]
    fn open_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("checkpoints");

        let store = CheckpointStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.path(), dir.join(CHECKPOINT_FILE));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o007, 0, "checkpoint dir must not be world-accessible");
        }
    }

    #[test]
    fn open_accepts_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        CheckpointStore::open(tmp.path()).unwrap();
    }

    #[test]
    fn open_rejects_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            CheckpointStore::open(&file),
            Err(CheckpointError::NotADirectory(p)) if p == file
        ));
    }

    #[test]
    fn load_missing_file_is_empty_and_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();

        let before = SystemTime::now();
        let checkpoint = store.load();
        assert!(checkpoint.is_empty());
        assert!(checkpoint.selections().is_empty());
        assert!(checkpoint.saved_at >= before);
    }

    #[test]
    fn load_corrupt_file_is_empty_and_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();
        fs::write(store.path(), b"{\"proxies\": {\"Proxy\": ").unwrap();

        assert!(matches!(
            store.try_load(),
            Err(CheckpointError::Corrupt { .. })
        ));

        let before = SystemTime::now();
        let checkpoint = store.load();
        assert!(checkpoint.is_empty());
        assert!(checkpoint.saved_at >= before);
    }

    #[test]
    fn load_wrong_shape_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();
        fs::write(store.path(), b"[1, 2, 3]").unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_preserves_selections() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();
        let proxies = snapshot(&[
            ("Proxy", "Selector", &["NodeA", "NodeB"], "NodeA"),
            ("Auto", "URLTest", &["NodeA", "NodeB"], "NodeB"),
            ("NodeA", "Shadowsocks", &[], ""),
        ]);

        let saved = store.save(&proxies).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.proxies, proxies);
        assert_eq!(loaded.selections(), saved.selections());
        assert_eq!(loaded.selections().len(), 2);
        assert_eq!(loaded.saved_at, saved.saved_at);
    }

    #[test]
    fn save_replaces_previous_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();

        store
            .save(&snapshot(&[("Proxy", "Selector", &["NodeA", "NodeB"], "NodeA")]))
            .unwrap();
        let before = SystemTime::now();
        store
            .save(&snapshot(&[("Proxy", "Selector", &["NodeA", "NodeB"], "NodeB")]))
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.selections()["Proxy"], "NodeB");
        assert!(not_before(loaded.saved_at, before));
        assert!(!tmp.path().join(TEMP_FILE).exists());
    }

    #[test]
    fn saved_file_is_the_proxies_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();
        store
            .save(&snapshot(&[("Proxy", "Selector", &["NodeA"], "NodeA")]))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["proxies"]["Proxy"]["type"], "Selector");
        assert_eq!(raw["proxies"]["Proxy"]["now"], "NodeA");
        assert_eq!(raw["proxies"]["Proxy"]["all"][0], "NodeA");
    }

    #[test]
    fn save_into_vanished_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("ckpt");
        let store = CheckpointStore::open(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let err = store.save(&ProxySnapshot::default()).unwrap_err();
        assert!(matches!(err, CheckpointError::Io { .. }));
    }
}
