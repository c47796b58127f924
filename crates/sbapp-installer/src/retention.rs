use std::fs;
use std::path::Path;

use tracing::{debug, warn};

pub const RETAINED_CACHE_ITEMS: usize = 4;

/// Keeps the `keep` lexically greatest entries of `download_dir` and deletes
/// the rest. Failures are logged and never returned. Returns how many
/// entries were removed.
pub fn cleanup_cache(download_dir: &Path, keep: usize) -> usize {
    let entries = match fs::read_dir(download_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %download_dir.display(), error = %err, "no cache to clean");
            return 0;
        }
    };

    let mut names: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for name in names.into_iter().skip(keep) {
        let path = download_dir.join(&name);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale cache item");
                removed += 1;
            }
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove cache item"),
        }
    }
    removed
}
