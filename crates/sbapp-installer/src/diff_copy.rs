use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::fs_utils::{copy_atomic, set_executable};

/// Copies each of `names` from `src_dir` into `dst_dir` when the destination
/// is missing or differs byte-wise. Names absent from `src_dir` are skipped.
/// Only copied files that are listed in `bin_names` get the executable bit.
///
/// Returns the number of files written; zero when `dst_dir` already matches.
pub fn install_diff_copy<S: AsRef<str>>(
    src_dir: &Path,
    dst_dir: &Path,
    names: &[S],
    bin_names: &[String],
) -> Result<usize> {
    let mut copied = 0;
    for name in names {
        let name = name.as_ref();
        let src = src_dir.join(name);
        if !src.is_file() {
            debug!(file = name, src = %src_dir.display(), "not shipped; skipping");
            continue;
        }

        let dst = dst_dir.join(name);
        if dst.is_file() && same_contents(&src, &dst)? {
            continue;
        }

        if !dst_dir.exists() {
            fs::create_dir_all(dst_dir)
                .with_context(|| format!("failed to create {}", dst_dir.display()))?;
        }
        copy_atomic(&src, &dst)?;
        if bin_names.iter().any(|bin| bin == name) {
            set_executable(&dst)?;
        }
        debug!(file = name, dst = %dst_dir.display(), "installed");
        copied += 1;
    }
    Ok(copied)
}

fn same_contents(left: &Path, right: &Path) -> Result<bool> {
    let left_len = fs::metadata(left)
        .with_context(|| format!("failed to stat {}", left.display()))?
        .len();
    let right_len = fs::metadata(right)
        .with_context(|| format!("failed to stat {}", right.display()))?
        .len();
    if left_len != right_len {
        return Ok(false);
    }

    let mut left_reader = BufReader::new(
        File::open(left).with_context(|| format!("failed to open {}", left.display()))?,
    );
    let mut right_reader = BufReader::new(
        File::open(right).with_context(|| format!("failed to open {}", right.display()))?,
    );
    let mut left_buf = [0_u8; 64 * 1024];
    let mut right_buf = [0_u8; 64 * 1024];
    loop {
        let read = left_reader
            .read(&mut left_buf)
            .with_context(|| format!("failed to read {}", left.display()))?;
        if read == 0 {
            return Ok(true);
        }
        right_reader
            .read_exact(&mut right_buf[..read])
            .with_context(|| format!("failed to read {}", right.display()))?;
        if left_buf[..read] != right_buf[..read] {
            return Ok(false);
        }
    }
}
