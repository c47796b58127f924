use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use tracing::{debug, warn};

struct HeldLock {
    file: File,
    depth: usize,
}

fn held_locks() -> MutexGuard<'static, HashMap<PathBuf, HeldLock>> {
    static HELD: OnceLock<Mutex<HashMap<PathBuf, HeldLock>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive, re-entrant lock on one app's install state.
///
/// The first guard for a path takes an advisory file lock; nested guards in
/// the same process only bump a counter. The file lock is released when the
/// last guard drops, and by the OS if the process dies.
#[derive(Debug)]
pub struct AppLock {
    path: PathBuf,
}

impl AppLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        if let Some(held) = held_locks().get_mut(&path) {
            held.depth += 1;
            debug!(lock = %path.display(), depth = held.depth, "re-entered app lock");
            return Ok(Self { path });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create lock dir: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open lock file: {}", path.display()))?;
        debug!(lock = %path.display(), "waiting for app lock");
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", path.display()))?;

        held_locks()
            .entry(path.clone())
            .and_modify(|held| held.depth += 1)
            .or_insert(HeldLock { file, depth: 1 });
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn depth(path: &Path) -> usize {
        held_locks().get(path).map_or(0, |held| held.depth)
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        let mut held = held_locks();
        let Some(entry) = held.get_mut(&self.path) else {
            return;
        };
        entry.depth -= 1;
        if entry.depth > 0 {
            return;
        }
        if let Some(released) = held.remove(&self.path) {
            if let Err(err) = FileExt::unlock(&released.file) {
                warn!(lock = %self.path.display(), error = %err, "failed to release app lock");
            }
        }
    }
}
