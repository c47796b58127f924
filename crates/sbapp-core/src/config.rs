use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TokenSource;
use crate::host::{Arch, Platform};

const BUILTIN_APPS: &str = include_str!("default_apps.toml");
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    User,
    Workdir,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    #[default]
    None,
    Rust,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SrcType {
    #[default]
    Repo,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub name: String,
    pub assets_name: Option<String>,
    pub bin_names: Vec<String>,
    pub repo_url: String,
    pub repo_branch: Option<String>,
    pub force_tag: Option<String>,
    pub asset_name_filter: Option<String>,
    pub install_scope: InstallScope,
    #[serde(default = "default_true")]
    pub precompiled: bool,
    pub precompiled_path_hint: Option<String>,
    #[serde(default)]
    pub build_type: BuildType,
    #[serde(default)]
    pub src_type: SrcType,
    pub src_path: Option<String>,
    pub bin_subdir: Option<String>,
    #[serde(default)]
    pub extra_bin_dirs: Vec<String>,
}

/// One `[[known_bad]]` table. Unset platform or arch matches any host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnownBadConfig {
    pub tag: String,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct RawAppsFile {
    github_token: Option<String>,
    network_timeout_secs: Option<u64>,
    #[serde(default)]
    apps: Vec<AppConfig>,
    #[serde(default)]
    known_bad: Vec<KnownBadConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub value: String,
    pub source: TokenSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppsConfig {
    pub apps: Vec<AppConfig>,
    pub known_bad: Vec<KnownBadConfig>,
    pub network_timeout_secs: u64,
    config_token: Option<String>,
    user_file: Option<PathBuf>,
    cli_force_tags: HashSet<String>,
}

impl AppsConfig {
    pub fn builtin() -> Result<Self> {
        let raw = parse_raw(BUILTIN_APPS).context("failed to parse built-in app definitions")?;
        Ok(Self {
            apps: raw.apps,
            known_bad: raw.known_bad,
            network_timeout_secs: raw
                .network_timeout_secs
                .unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS),
            config_token: None,
            user_file: None,
            cli_force_tags: HashSet::new(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::builtin()?;
        if !path.exists() {
            return Ok(config);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read app config: {}", path.display()))?;
        config
            .overlay_str(&raw, path)
            .with_context(|| format!("failed to parse app config: {}", path.display()))?;
        Ok(config)
    }

    pub fn overlay_str(&mut self, input: &str, path: &Path) -> Result<()> {
        let raw = parse_raw(input)?;
        for app in raw.apps {
            match self.apps.iter_mut().find(|existing| existing.name == app.name) {
                Some(existing) => *existing = app,
                None => self.apps.push(app),
            }
        }
        self.known_bad.extend(raw.known_bad);
        if let Some(timeout) = raw.network_timeout_secs {
            self.network_timeout_secs = timeout;
        }
        if raw.github_token.is_some() {
            self.config_token = raw.github_token;
        }
        self.user_file = Some(path.to_path_buf());
        Ok(())
    }

    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Command line settings win over every file.
    pub fn apply_cli_overrides(
        &mut self,
        name: &str,
        force_tag: Option<String>,
        no_precompiled: bool,
    ) -> Result<()> {
        let app = self
            .apps
            .iter_mut()
            .find(|app| app.name == name)
            .ok_or_else(|| anyhow!("unknown app '{name}'"))?;
        if let Some(tag) = force_tag {
            app.force_tag = Some(tag);
            self.cli_force_tags.insert(name.to_string());
        }
        if no_precompiled {
            app.precompiled = false;
        }
        Ok(())
    }

    pub fn force_tag_source(&self, name: &str) -> String {
        if self.cli_force_tags.contains(name) {
            "the --force-tag option".to_string()
        } else {
            self.source_label()
        }
    }

    pub fn source_label(&self) -> String {
        match &self.user_file {
            Some(path) => path.display().to_string(),
            None => "built-in app definitions".to_string(),
        }
    }

    /// `GITHUB_TOKEN` wins over the config file.
    pub fn api_token(&self) -> Option<ApiToken> {
        self.api_token_with(std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn api_token_with(&self, env_token: Option<String>) -> Option<ApiToken> {
        if let Some(value) = env_token.filter(|v| !v.trim().is_empty()) {
            return Some(ApiToken {
                value: value.trim().to_string(),
                source: TokenSource::Environment,
            });
        }
        let value = self.config_token.as_deref()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(ApiToken {
            value: value.to_string(),
            source: TokenSource::ConfigFile(self.user_file.clone().unwrap_or_default()),
        })
    }
}

fn parse_raw(input: &str) -> Result<RawAppsFile> {
    let raw: RawAppsFile = toml::from_str(input).context("invalid sbapp config")?;

    let mut seen = HashSet::new();
    for app in &raw.apps {
        if app.name.trim().is_empty() {
            return Err(anyhow!("app name must not be empty"));
        }
        if !seen.insert(app.name.as_str()) {
            return Err(anyhow!("duplicate app definition '{}'", app.name));
        }
        if app.bin_names.is_empty() {
            return Err(anyhow!("app '{}' must declare at least one binary", app.name));
        }
        if let Some(bin) = app
            .bin_names
            .iter()
            .find(|bin| bin.trim().is_empty() || bin.contains('/'))
        {
            return Err(anyhow!(
                "app '{}' declares an invalid binary name '{bin}'",
                app.name
            ));
        }
    }
    for entry in &raw.known_bad {
        if entry.tag.trim().is_empty() {
            return Err(anyhow!("known_bad entries must name a tag"));
        }
        if let Some(platform) = &entry.platform {
            Platform::parse(platform)
                .ok_or_else(|| anyhow!("known_bad entry has unknown platform '{platform}'"))?;
        }
        if let Some(arch) = &entry.arch {
            Arch::parse(arch)
                .ok_or_else(|| anyhow!("known_bad entry has unknown arch '{arch}'"))?;
        }
    }
    Ok(raw)
}

fn default_true() -> bool {
    true
}
