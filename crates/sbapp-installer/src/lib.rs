use anyhow::{Context, Result};
use sbapp_core::{
    precomp_error, probe_host, AppDescriptor, BuildType, HostTarget, Origin, PrecompError,
    SuibaseLayout, VersionRecord,
};
use sbapp_resolver::{ReleaseResolver, ReleaseTransport, ResolvedRelease};
use tracing::{debug, info};

mod diff_copy;
mod fetch;
mod fs_utils;
mod ledger;
mod lock;
mod process;
mod retention;
mod source_build;

pub use diff_copy::install_diff_copy;
pub use fetch::{
    detect_layout, ArtifactFetcher, CacheEntry, Downloader, LayoutVersion, FETCH_ATTEMPTS,
};
pub use ledger::{
    installed_record, latest_record, read_version_record, write_latest_record,
    write_version_record,
};
pub use lock::AppLock;
pub use process::CancelToken;
pub use retention::{cleanup_cache, RETAINED_CACHE_ITEMS};
pub use source_build::{CargoSourceBuilder, SourceBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled(VersionRecord),
    Installed {
        record: VersionRecord,
        tag: Option<String>,
    },
}

impl InstallOutcome {
    pub fn record(&self) -> &VersionRecord {
        match self {
            Self::AlreadyInstalled(record) | Self::Installed { record, .. } => record,
        }
    }
}

pub trait Installable {
    fn descriptor(&self) -> &AppDescriptor;

    fn installed_record(&self) -> Option<VersionRecord> {
        installed_record(self.descriptor()).ok().flatten()
    }

    fn install(&self) -> Result<InstallOutcome>;

    fn cleanup_cache(&self) -> usize {
        cleanup_cache(&self.descriptor().cache_path, RETAINED_CACHE_ITEMS)
    }
}

pub struct PrecompiledInstaller<'a, T, D> {
    descriptor: &'a AppDescriptor,
    host: HostTarget,
    resolver: &'a ReleaseResolver<T>,
    fetcher: &'a ArtifactFetcher<D>,
}

impl<'a, T: ReleaseTransport, D: Downloader> PrecompiledInstaller<'a, T, D> {
    pub fn new(
        descriptor: &'a AppDescriptor,
        host: HostTarget,
        resolver: &'a ReleaseResolver<T>,
        fetcher: &'a ArtifactFetcher<D>,
    ) -> Self {
        Self {
            descriptor,
            host,
            resolver,
            fetcher,
        }
    }

    /// Every destination already holds `resolved` with its primary binary.
    fn already_installed(&self, resolved: &ResolvedRelease) -> Option<VersionRecord> {
        let descriptor = self.descriptor;
        let mut found = None;
        for dir in descriptor.install_dirs() {
            if !dir.join(descriptor.primary_bin()).is_file() {
                return None;
            }
            let record = read_version_record(&dir.join(descriptor.version_file_name()))
                .ok()
                .flatten()?;
            let current = record.version == resolved.semantic_version
                && record.origin == Some(Origin::Precompiled)
                && record.branch.as_deref() == Some(descriptor.repo_branch.as_str());
            if !current {
                return None;
            }
            if found.is_none() {
                found = Some(record);
            }
        }
        found
    }
}

impl<T: ReleaseTransport, D: Downloader> Installable for PrecompiledInstaller<'_, T, D> {
    fn descriptor(&self) -> &AppDescriptor {
        self.descriptor
    }

    fn install(&self) -> Result<InstallOutcome> {
        let descriptor = self.descriptor;
        let resolved = self.resolver.resolve(descriptor, self.host)?;
        debug!(tag = %resolved.tag_name, url = %resolved.download_url, "resolved release");

        if let Some(record) = self.already_installed(&resolved) {
            return Ok(InstallOutcome::AlreadyInstalled(record));
        }

        let entry = self.fetcher.fetch(&resolved, descriptor)?;

        // The version record goes last so it never describes missing binaries.
        let mut names: Vec<String> = descriptor.bin_names.clone();
        names.push(descriptor.version_file_name());
        for dst in descriptor.install_dirs() {
            let copied =
                install_diff_copy(&entry.bin_dir, dst, names.as_slice(), &descriptor.bin_names)?;
            debug!(dst = %dst.display(), copied, "installed precompiled binaries");
        }

        let removed = self.cleanup_cache();
        if removed > 0 {
            debug!(removed, "pruned release cache");
        }

        let record = read_version_record(&entry.bin_dir.join(descriptor.version_file_name()))?
            .unwrap_or_else(|| {
                VersionRecord::precompiled(
                    resolved.semantic_version.clone(),
                    descriptor.repo_branch.clone(),
                )
            });
        Ok(InstallOutcome::Installed {
            record,
            tag: Some(resolved.tag_name),
        })
    }
}

pub struct SourceInstaller<'a, B> {
    descriptor: &'a AppDescriptor,
    builder: &'a B,
}

impl<'a, B: SourceBuilder> SourceInstaller<'a, B> {
    pub fn new(descriptor: &'a AppDescriptor, builder: &'a B) -> Self {
        Self {
            descriptor,
            builder,
        }
    }
}

impl<B: SourceBuilder> Installable for SourceInstaller<'_, B> {
    fn descriptor(&self) -> &AppDescriptor {
        self.descriptor
    }

    fn install(&self) -> Result<InstallOutcome> {
        let record = self.builder.build_from_source(self.descriptor)?;
        Ok(InstallOutcome::Installed { record, tag: None })
    }
}

/// Runs one install under the app lock, falling back to a source build when
/// no precompiled binary exists for this host.
pub struct AppInstaller<'a, T, D, B> {
    layout: &'a SuibaseLayout,
    resolver: &'a ReleaseResolver<T>,
    fetcher: &'a ArtifactFetcher<D>,
    builder: &'a B,
    host_probe: fn() -> Result<HostTarget, PrecompError>,
    notice: Option<Box<dyn Fn(&str) + 'a>>,
}

impl<'a, T, D, B> AppInstaller<'a, T, D, B>
where
    T: ReleaseTransport,
    D: Downloader,
    B: SourceBuilder,
{
    pub fn new(
        layout: &'a SuibaseLayout,
        resolver: &'a ReleaseResolver<T>,
        fetcher: &'a ArtifactFetcher<D>,
        builder: &'a B,
    ) -> Self {
        Self {
            layout,
            resolver,
            fetcher,
            builder,
            host_probe: probe_host,
            notice: None,
        }
    }

    pub fn with_host_probe(mut self, probe: fn() -> Result<HostTarget, PrecompError>) -> Self {
        self.host_probe = probe;
        self
    }

    pub fn with_notice(mut self, notice: impl Fn(&str) + 'a) -> Self {
        self.notice = Some(Box::new(notice));
        self
    }

    pub fn install(&self, descriptor: &AppDescriptor) -> Result<InstallOutcome> {
        let lock_path = self.layout.lock_path(&descriptor.lock_key());
        let _lock = AppLock::acquire(&lock_path)
            .with_context(|| format!("failed to lock {}", descriptor.display_name()))?;

        let source = SourceInstaller::new(descriptor, self.builder);
        if !descriptor.precompiled_allowed {
            self.notify(&format!(
                "precompiled binaries disabled for {}; building from source",
                descriptor.display_name()
            ));
            return source.install();
        }

        let result = (self.host_probe)().map_err(anyhow::Error::from).and_then(|host| {
            PrecompiledInstaller::new(descriptor, host, self.resolver, self.fetcher).install()
        });
        match result {
            Err(err)
                if descriptor.build_type != BuildType::None
                    && precomp_error(&err).is_some_and(PrecompError::triggers_build_fallback) =>
            {
                info!(app = %descriptor.config_name, reason = %err, "falling back to source build");
                self.notify(&format!("{err}; building from source"));
                source.install()
            }
            other => other,
        }
    }

    fn notify(&self, line: &str) {
        if let Some(notice) = &self.notice {
            notice(line);
        }
    }
}
