//! The persistent, locked build state store: an exclusive advisory lock
//! guards the state file for the lifetime of a `StateStore`, and every
//! save goes through a write-then-rename so a reader never observes a
//! half-written file. A second process contending for the lock fails fast
//! rather than blocking.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::spi::types::{PakeError, StateRecord};

/// Bound on the open/lock/verify retry loop used to detect a concurrent
/// rename racing our own open, so a pathological case cannot spin forever.
const MAX_OPEN_ATTEMPTS: usize = 64;

/// The on-disk, locked build state. Holds an exclusive advisory lock on
/// the state file for its entire lifetime; the lock is released when the
/// store is dropped.
pub struct StateStore {
    path: PathBuf,
    locked: Flock<File>,
    records: BTreeMap<String, StateRecord>,
}

impl StateStore {
    /// Open (creating if absent) and exclusively lock the state file at
    /// `path`, loading its current contents.
    ///
    /// Returns a user-facing error immediately if another process already
    /// holds the lock, rather than blocking.
    pub fn open(path: &Path) -> Result<StateStore, PakeError> {
        let locked = open_and_lock(path)?;

        let mut contents = String::new();
        (&*locked)
            .try_clone()
            .and_then(|mut f| {
                f.read_to_string(&mut contents)?;
                Ok(())
            })
            .map_err(|e| PakeError::User(format!("failed to read state file: {e}")))?;

        let records = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents).map_err(|e| {
                PakeError::User(format!(
                    "state file {} is corrupt: {e}",
                    path.display()
                ))
            })?
        };

        Ok(StateStore { path: path.to_path_buf(), locked, records })
    }

    /// The recorded state for `target`, if any.
    pub fn get(&self, target: &str) -> Option<&StateRecord> {
        self.records.get(target)
    }

    /// Record the result of building `target`.
    pub fn set(&mut self, target: String, record: StateRecord) {
        self.records.insert(target, record);
    }

    /// Atomically persist the current state: write to a sibling temp file,
    /// lock it, rename it over the original, then swap our held lock to
    /// the new file. The old lock is released only after the rename
    /// succeeds, so a reader can never observe a half-written file.
    pub fn save(&mut self) -> Result<(), PakeError> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| PakeError::User(format!("failed to serialize state: {e}")))?;

        let tmp_path = self.path.with_extension(format!(
            "{}.tmp",
            unique_suffix(),
        ));

        {
            let mut tmp = File::create(&tmp_path)
                .map_err(|e| PakeError::User(format!("failed to create temp state file: {e}")))?;
            tmp.write_all(json.as_bytes())
                .map_err(|e| PakeError::User(format!("failed to write temp state file: {e}")))?;
            tmp.flush()
                .map_err(|e| PakeError::User(format!("failed to flush temp state file: {e}")))?;
        }

        let tmp_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&tmp_path)
            .map_err(|e| PakeError::User(format!("failed to reopen temp state file: {e}")))?;
        let new_lock = Flock::lock(tmp_file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            PakeError::User(format!("failed to lock temp state file: {errno}"))
        })?;

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| PakeError::User(format!("failed to replace state file: {e}")))?;

        // Drop the old lock only now that the new file is safely in place.
        self.locked = new_lock;
        Ok(())
    }
}

fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{n:x}", std::process::id())
}

/// Open `path`, acquire a non-blocking exclusive lock, and verify the
/// locked file descriptor still refers to the same inode the path
/// currently names (guards against a concurrent rename landing between
/// our `open()` and `flock()`).
fn open_and_lock(path: &Path) -> Result<Flock<File>, PakeError> {
    for _ in 0..MAX_OPEN_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| PakeError::User(format!("failed to open state file {}: {e}", path.display())))?;

        let fd_meta = file
            .metadata()
            .map_err(|e| PakeError::User(format!("failed to stat state file: {e}")))?;

        let locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, Errno::EWOULDBLOCK)) | Err((_, Errno::EAGAIN)) => {
                return Err(PakeError::User(format!(
                    "another instance of pake is already running against {}",
                    path.display()
                )));
            }
            Err((_, errno)) => {
                return Err(PakeError::User(format!("failed to lock state file: {errno}")));
            }
        };

        match fs::metadata(path) {
            Ok(path_meta) if path_meta.dev() == fd_meta.dev() && path_meta.ino() == fd_meta.ino() => {
                return Ok(locked);
            }
            _ => continue,
        }
    }

    Err(PakeError::User(format!(
        "could not acquire a stable lock on {} (too much concurrent replacement)",
        path.display()
    )))
}
