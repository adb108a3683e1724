//! resurrect-checkpoint — persisted proxy selections.
//!
//! A checkpoint is the daemon's `/proxies` document written verbatim to
//! `<dir>/proxies.json`. Its save time is the file's modification time;
//! nothing inside the document records it.
//!
//! Loading never fails: a missing, unreadable or corrupt file yields an
//! empty checkpoint stamped with the current time, so a bad file can
//! never halt the watchdog. Saving replaces the file atomically through a
//! temporary sibling and `rename`.

pub mod error;
pub mod store;

pub use error::{CheckpointError, CheckpointResult};
pub use store::{CHECKPOINT_FILE, Checkpoint, CheckpointStore};
