use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

pub(crate) fn staging_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("path has no file name: {}", path.display()))?;
    Ok(path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id())))
}

/// Writes `bytes` next to `path` and renames over it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let staged = staging_path(path)?;
    fs::write(&staged, bytes)
        .with_context(|| format!("failed to write {}", staged.display()))?;
    if let Err(err) = fs::rename(&staged, path) {
        let _ = fs::remove_file(&staged);
        return Err(err).with_context(|| format!("failed to move {} into place", path.display()));
    }
    Ok(())
}

/// Copies `src` next to `dst` and renames over it.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<()> {
    let staged = staging_path(dst)?;
    fs::copy(src, &staged).with_context(|| {
        format!("failed to copy {} to {}", src.display(), staged.display())
    })?;
    if let Err(err) = fs::rename(&staged, dst) {
        let _ = fs::remove_file(&staged);
        return Err(err).with_context(|| format!("failed to move {} into place", dst.display()));
    }
    Ok(())
}

#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("failed to set executable mode on {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
