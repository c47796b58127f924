use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use sbapp_core::{
    archive_file_name, extracted_dir_name, AppDescriptor, ArchiveType, PrecompError,
    VersionRecord,
};
use sbapp_resolver::ResolvedRelease;
use sbapp_security::{parse_sha256_digest, sha256_file_hex};
use tracing::{debug, warn};

use crate::fs_utils::{remove_dir_if_exists, remove_file_if_exists};
use crate::ledger::write_version_record;
use crate::process::run_command;

pub const FETCH_ATTEMPTS: u32 = 2;

pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

impl<T: Downloader + ?Sized> Downloader for &T {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        (**self).download(url, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVersion {
    V1,
    V2,
    Search,
}

impl LayoutVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::Search => "found-by-search",
        }
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub download_dir: PathBuf,
    pub archive_file: PathBuf,
    pub extracted_dir: PathBuf,
    pub layout: LayoutVersion,
    pub bin_dir: PathBuf,
}

enum AttemptFailure {
    Integrity(PrecompError),
    Other(String),
}

pub struct ArtifactFetcher<D> {
    downloader: D,
    notice: Option<Box<dyn Fn(&str)>>,
}

impl<D: Downloader> ArtifactFetcher<D> {
    pub fn new(downloader: D) -> Self {
        Self {
            downloader,
            notice: None,
        }
    }

    pub fn with_notice(mut self, notice: impl Fn(&str) + 'static) -> Self {
        self.notice = Some(Box::new(notice));
        self
    }

    pub fn fetch(&self, resolved: &ResolvedRelease, descriptor: &AppDescriptor) -> Result<CacheEntry> {
        let file_name = archive_file_name(&resolved.download_url)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("cannot derive a file name from {}", resolved.download_url))?;
        if ArchiveType::infer_from_url(file_name).is_none() {
            return Err(PrecompError::UnsupportedArchive {
                file_name: file_name.to_string(),
            }
            .into());
        }

        let download_dir = descriptor.cache_path.clone();
        fs::create_dir_all(&download_dir)
            .with_context(|| format!("failed to create {}", download_dir.display()))?;
        let archive_file = download_dir.join(file_name);
        let extracted_dir = download_dir.join(extracted_dir_name(file_name));
        let record_name = descriptor.version_file_name();

        if archive_file.is_file() {
            if let Some((layout, bin_dir)) = detect_layout(&extracted_dir, descriptor) {
                let v2_dir = extracted_dir.join(&descriptor.bin_subdir);
                let recorded = [&bin_dir, &v2_dir, &extracted_dir]
                    .iter()
                    .any(|dir| dir.join(&record_name).is_file());
                if recorded {
                    debug!(archive = %archive_file.display(), %layout, "cached extraction is complete");
                    return Ok(CacheEntry {
                        download_dir,
                        archive_file,
                        extracted_dir,
                        layout,
                        bin_dir,
                    });
                }
            }
        }

        let mut last_failure = AttemptFailure::Other(String::new());
        for attempt in 1..=FETCH_ATTEMPTS {
            if attempt > 1 {
                self.notify(&format!(
                    "retrying download of {file_name} (attempt {attempt}/{FETCH_ATTEMPTS})"
                ));
            }
            match self.attempt(resolved, descriptor, &archive_file, &extracted_dir) {
                Ok((layout, bin_dir)) => {
                    let record = VersionRecord::precompiled(
                        resolved.semantic_version.clone(),
                        descriptor.repo_branch.clone(),
                    );
                    write_version_record(&bin_dir.join(&record_name), &record)?;
                    debug!(archive = %archive_file.display(), %layout, "fetched release archive");
                    return Ok(CacheEntry {
                        download_dir,
                        archive_file,
                        extracted_dir,
                        layout,
                        bin_dir,
                    });
                }
                Err(failure) => {
                    if let AttemptFailure::Other(reason) = &failure {
                        debug!(attempt, reason = %reason, "fetch attempt failed");
                    }
                    let _ = remove_file_if_exists(&archive_file);
                    let _ = remove_dir_if_exists(&extracted_dir);
                    last_failure = failure;
                }
            }
        }

        match last_failure {
            AttemptFailure::Integrity(err) => Err(err.into()),
            AttemptFailure::Other(reason) => {
                warn!(archive = file_name, reason = %reason, "giving up on precompiled archive");
                Err(PrecompError::Extraction {
                    branch: descriptor.repo_branch.clone(),
                }
                .into())
            }
        }
    }

    fn attempt(
        &self,
        resolved: &ResolvedRelease,
        descriptor: &AppDescriptor,
        archive_file: &Path,
        extracted_dir: &Path,
    ) -> std::result::Result<(LayoutVersion, PathBuf), AttemptFailure> {
        let other = |err: anyhow::Error| AttemptFailure::Other(format!("{err:#}"));

        self.download_to_cache(&resolved.download_url, archive_file)
            .map_err(other)?;
        if let Some(digest) = &resolved.digest {
            verify_digest(archive_file, digest)?;
        }

        remove_dir_if_exists(extracted_dir)
            .with_context(|| format!("failed to clear {}", extracted_dir.display()))
            .map_err(other)?;
        fs::create_dir_all(extracted_dir)
            .with_context(|| format!("failed to create {}", extracted_dir.display()))
            .map_err(other)?;
        extract_archive(archive_file, extracted_dir).map_err(other)?;

        detect_layout(extracted_dir, descriptor).ok_or_else(|| {
            AttemptFailure::Other(format!(
                "'{}' not found in {}",
                descriptor.primary_bin(),
                extracted_dir.display()
            ))
        })
    }

    fn download_to_cache(&self, url: &str, archive_file: &Path) -> Result<()> {
        let part = archive_file.with_file_name(format!(
            "{}.part",
            archive_file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download")
        ));
        let _ = remove_file_if_exists(&part);
        self.downloader.download(url, &part)?;
        fs::rename(&part, archive_file).with_context(|| {
            format!(
                "failed to move downloaded archive into cache: {}",
                archive_file.display()
            )
        })
    }

    fn notify(&self, line: &str) {
        if let Some(notice) = &self.notice {
            notice(line);
        }
    }
}

fn verify_digest(archive_file: &Path, digest: &str) -> std::result::Result<(), AttemptFailure> {
    let expected = match parse_sha256_digest(digest) {
        Ok(expected) => expected,
        Err(err) => {
            debug!(digest, error = %err, "unusable asset digest; skipping verification");
            return Ok(());
        }
    };
    let actual = sha256_file_hex(archive_file)
        .map_err(|err| AttemptFailure::Other(format!("{err:#}")))?;
    if actual == expected {
        return Ok(());
    }
    Err(AttemptFailure::Integrity(PrecompError::IntegrityMismatch {
        file: archive_file.display().to_string(),
        expected,
        actual,
    }))
}

fn extract_archive(archive_file: &Path, dst: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_file)
            .arg("-C")
            .arg(dst),
        "failed to extract release archive",
    )
}

/// V2, then V1, then a search of the whole tree.
pub fn detect_layout(
    extracted_dir: &Path,
    descriptor: &AppDescriptor,
) -> Option<(LayoutVersion, PathBuf)> {
    let binary = descriptor.primary_bin();

    let v2_dir = extracted_dir.join(&descriptor.bin_subdir);
    if v2_dir.join(binary).is_file() {
        return Some((LayoutVersion::V2, v2_dir));
    }
    if extracted_dir.join(binary).is_file() {
        return Some((LayoutVersion::V1, extracted_dir.to_path_buf()));
    }
    find_file(extracted_dir, binary).map(|dir| (LayoutVersion::Search, dir))
}

fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    entries.sort();

    if entries
        .iter()
        .any(|path| path.is_file() && path.file_name().is_some_and(|file| file == name))
    {
        return Some(dir.to_path_buf());
    }
    entries
        .iter()
        .filter(|path| path.is_dir() && !path.is_symlink())
        .find_map(|path| find_file(path, name))
}
