use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::config::{AppConfig, AppsConfig, BuildType, InstallScope, SrcType};
use crate::layout::{SuibaseLayout, COMMON_WORKDIR};

const DEFAULT_BIN_SUBDIR: &str = "bin";
const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetNameFilter {
    All,
    Branch,
    Substring(String),
}

impl AssetNameFilter {
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::All,
            Some("branch") => Self::Branch,
            Some(other) => Self::Substring(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub config_name: String,
    pub workdir: Option<String>,
    pub assets_name: String,
    pub bin_names: Vec<String>,
    pub repo_url: String,
    pub repo_branch: String,
    pub force_tag: Option<String>,
    pub force_tag_source: String,
    pub asset_name_filter: AssetNameFilter,
    pub install_scope: InstallScope,
    pub precompiled_allowed: bool,
    pub precompiled_path_hint: Option<String>,
    pub build_type: BuildType,
    pub src_type: SrcType,
    pub src_path: PathBuf,
    pub bin_subdir: String,
    pub local_bin_path: PathBuf,
    pub extra_bin_dirs: Vec<PathBuf>,
    pub cache_path: PathBuf,
}

impl AppDescriptor {
    pub fn from_config(
        app: &AppConfig,
        workdir: Option<&str>,
        layout: &SuibaseLayout,
        force_tag_source: &str,
    ) -> Result<Self> {
        let workdir = match app.install_scope {
            InstallScope::User => None,
            InstallScope::Workdir => {
                let workdir = workdir.map(str::trim).filter(|w| !w.is_empty()).ok_or_else(
                    || anyhow!("app '{}' is installed per workdir; a workdir is required", app.name),
                )?;
                Some(workdir.to_string())
            }
        };

        let assets_name = app
            .assets_name
            .clone()
            .unwrap_or_else(|| app.name.clone());
        let repo_branch = app
            .repo_branch
            .clone()
            .or_else(|| workdir.clone())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let bin_subdir = app
            .bin_subdir
            .clone()
            .unwrap_or_else(|| DEFAULT_BIN_SUBDIR.to_string());

        let local_bin_path = match (&app.precompiled_path_hint, &workdir) {
            (Some(hint), _) => layout.resolve_hint(hint),
            (None, Some(workdir)) => layout.workdir_dir(workdir).join(&bin_subdir),
            (None, None) => layout.user_bin_dir(),
        };
        let src_path = match &app.src_path {
            Some(path) => layout.resolve_hint(path),
            None => layout
                .workdir_dir(workdir.as_deref().unwrap_or(COMMON_WORKDIR))
                .join(format!("{assets_name}-repo")),
        };
        let extra_bin_dirs = app
            .extra_bin_dirs
            .iter()
            .map(|dir| layout.resolve_hint(dir))
            .collect();
        let cache_path = layout.download_dir(&assets_name, &repo_branch);

        Ok(Self {
            config_name: app.name.clone(),
            workdir,
            assets_name,
            bin_names: app.bin_names.clone(),
            repo_url: app.repo_url.clone(),
            repo_branch,
            force_tag: app.force_tag.clone().filter(|tag| !tag.trim().is_empty()),
            force_tag_source: force_tag_source.to_string(),
            asset_name_filter: AssetNameFilter::from_config(app.asset_name_filter.as_deref()),
            install_scope: app.install_scope,
            precompiled_allowed: app.precompiled,
            precompiled_path_hint: app.precompiled_path_hint.clone(),
            build_type: app.build_type,
            src_type: app.src_type,
            src_path,
            bin_subdir,
            local_bin_path,
            extra_bin_dirs,
            cache_path,
        })
    }

    /// Binary whose presence proves an extraction or install succeeded.
    pub fn primary_bin(&self) -> &str {
        &self.bin_names[0]
    }

    pub fn version_file_name(&self) -> String {
        format!("{}-version.yaml", self.assets_name)
    }

    pub fn latest_file_name(&self) -> String {
        format!("{}-latest.yaml", self.assets_name)
    }

    pub fn version_file_path(&self) -> PathBuf {
        self.local_bin_path.join(self.version_file_name())
    }

    pub fn latest_file_path(&self) -> PathBuf {
        self.local_bin_path.join(self.latest_file_name())
    }

    pub fn install_dirs(&self) -> Vec<&Path> {
        std::iter::once(self.local_bin_path.as_path())
            .chain(self.extra_bin_dirs.iter().map(PathBuf::as_path))
            .collect()
    }

    pub fn lock_key(&self) -> String {
        format!(
            "{}-{}",
            self.workdir.as_deref().unwrap_or(COMMON_WORKDIR),
            self.config_name
        )
    }

    pub fn display_name(&self) -> String {
        match &self.workdir {
            Some(workdir) => format!("{} ({workdir})", self.config_name),
            None => self.config_name.clone(),
        }
    }
}

#[derive(Debug)]
pub struct AppRegistry {
    config: AppsConfig,
    layout: SuibaseLayout,
    descriptors: BTreeMap<(String, Option<String>), Arc<AppDescriptor>>,
}

impl AppRegistry {
    pub fn new(config: AppsConfig, layout: SuibaseLayout) -> Self {
        Self {
            config,
            layout,
            descriptors: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AppsConfig {
        &self.config
    }

    pub fn layout(&self) -> &SuibaseLayout {
        &self.layout
    }

    pub fn init(&mut self, name: &str, workdir: Option<&str>) -> Result<Arc<AppDescriptor>> {
        let app = self
            .config
            .app(name)
            .ok_or_else(|| anyhow!("unknown app '{name}'"))?;
        let workdir_key = match app.install_scope {
            InstallScope::User => None,
            InstallScope::Workdir => workdir.map(str::to_string),
        };
        let key = (name.to_string(), workdir_key);
        if let Some(existing) = self.descriptors.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let descriptor = Arc::new(AppDescriptor::from_config(
            app,
            workdir,
            &self.layout,
            &self.config.force_tag_source(name),
        )?);
        debug!(
            app = name,
            bin = %descriptor.local_bin_path.display(),
            cache = %descriptor.cache_path.display(),
            "initialized app descriptor"
        );
        self.descriptors.insert(key, Arc::clone(&descriptor));
        Ok(descriptor)
    }
}
