use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sbapp_core::{AppDescriptor, VersionRecord};
use tracing::debug;

use crate::fs_utils::write_atomic;

/// Reads a version record. A missing file, or one without a `version`
/// line, reads as `None`.
pub fn read_version_record(path: &Path) -> Result<Option<VersionRecord>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read version record: {}", path.display()))
        }
    };
    let record = VersionRecord::parse(&String::from_utf8_lossy(&raw));
    if record.is_none() {
        debug!(path = %path.display(), "version record has no version; treating as absent");
    }
    Ok(record)
}

pub fn write_version_record(path: &Path, record: &VersionRecord) -> Result<()> {
    write_atomic(path, record.to_file_string().as_bytes())
        .with_context(|| format!("failed to write version record: {}", path.display()))
}

pub fn installed_record(descriptor: &AppDescriptor) -> Result<Option<VersionRecord>> {
    read_version_record(&descriptor.version_file_path())
}

pub fn latest_record(descriptor: &AppDescriptor) -> Result<Option<VersionRecord>> {
    read_version_record(&descriptor.latest_file_path())
}

pub fn write_latest_record(descriptor: &AppDescriptor, record: &VersionRecord) -> Result<()> {
    write_version_record(&descriptor.latest_file_path(), record)
}
