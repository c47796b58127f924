use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use sbapp_core::{strip_version_prefix, AppDescriptor, BuildType, Origin, SrcType, VersionRecord};
use tracing::{debug, info};

use crate::diff_copy::install_diff_copy;
use crate::ledger::write_version_record;
use crate::process::{command_stdout, run_command, run_interruptible, CancelToken};

pub trait SourceBuilder {
    fn build_from_source(&self, descriptor: &AppDescriptor) -> Result<VersionRecord>;
}

#[derive(Debug, Clone, Default)]
pub struct CargoSourceBuilder {
    cancel: CancelToken,
}

impl CargoSourceBuilder {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn prepare_checkout(&self, descriptor: &AppDescriptor) -> Result<()> {
        let src = &descriptor.src_path;
        match descriptor.src_type {
            SrcType::Local => {
                if !src.join("Cargo.toml").is_file() {
                    return Err(anyhow!(
                        "source for '{}' not found at {}",
                        descriptor.config_name,
                        src.display()
                    ));
                }
                Ok(())
            }
            SrcType::Repo if src.join(".git").exists() => {
                info!(repo = %src.display(), "updating source checkout");
                run_command(
                    Command::new("git").arg("-C").arg(src).args(["pull", "--ff-only"]),
                    "failed to update source checkout",
                )
            }
            SrcType::Repo => {
                if let Some(parent) = src.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                info!(repo = %descriptor.repo_url, branch = %descriptor.repo_branch, "cloning source");
                run_interruptible(
                    Command::new("git")
                        .args(["clone", "--branch", descriptor.repo_branch.as_str()])
                        .arg(&descriptor.repo_url)
                        .arg(src),
                    &self.cancel,
                    "failed to clone source repository",
                )
            }
        }
    }
}

impl SourceBuilder for CargoSourceBuilder {
    fn build_from_source(&self, descriptor: &AppDescriptor) -> Result<VersionRecord> {
        if descriptor.build_type == BuildType::None {
            return Err(anyhow!(
                "'{}' has no source build; precompiled binaries are required",
                descriptor.config_name
            ));
        }
        self.prepare_checkout(descriptor)?;

        let src = &descriptor.src_path;
        let mut cargo = Command::new("cargo");
        cargo.current_dir(src).args(["build", "--release"]);
        for bin in &descriptor.bin_names {
            cargo.arg("--bin").arg(bin);
        }
        run_interruptible(
            &mut cargo,
            &self.cancel,
            &format!("failed to build '{}' from source", descriptor.config_name),
        )?;

        let target_dir = src.join("target").join("release");
        let version = reported_version(&target_dir.join(descriptor.primary_bin()))?;
        let record = VersionRecord {
            version,
            branch: Some(descriptor.repo_branch.clone()),
            commit: command_stdout(
                Command::new("git")
                    .arg("-C")
                    .arg(src)
                    .args(["rev-parse", "--short", "HEAD"]),
            ),
            commit_date: command_stdout(
                Command::new("git")
                    .arg("-C")
                    .arg(src)
                    .args(["log", "-1", "--format=%cs"]),
            ),
            origin: Some(Origin::Built),
        };

        for dst in descriptor.install_dirs() {
            let copied = install_diff_copy(
                &target_dir,
                dst,
                descriptor.bin_names.as_slice(),
                &descriptor.bin_names,
            )?;
            write_version_record(&dst.join(descriptor.version_file_name()), &record)?;
            debug!(dst = %dst.display(), copied, "installed built binaries");
        }
        Ok(record)
    }
}

/// Version from `<bin> --version`, e.g. `sui 1.40.1-abc` gives `1.40.1-abc`.
fn reported_version(binary: &Path) -> Result<String> {
    let output = command_stdout(Command::new(binary).arg("--version"))
        .ok_or_else(|| anyhow!("failed to query version of {}", binary.display()))?;
    output
        .split_whitespace()
        .map(strip_version_prefix)
        .find(|word| word.starts_with(|ch: char| ch.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no version in output of {} --version", binary.display()))
}
