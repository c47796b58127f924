use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const COMMON_WORKDIR: &str = "common";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuibaseLayout {
    suibase_home: PathBuf,
    user_home: PathBuf,
}

impl SuibaseLayout {
    pub fn new(suibase_home: impl Into<PathBuf>, user_home: impl Into<PathBuf>) -> Self {
        Self {
            suibase_home: suibase_home.into(),
            user_home: user_home.into(),
        }
    }

    pub fn from_env(suibase_home: Option<&Path>) -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set; cannot resolve suibase home")?;
        let user_home = PathBuf::from(home);
        let suibase_home = suibase_home
            .map(Path::to_path_buf)
            .unwrap_or_else(|| user_home.join("suibase"));
        Ok(Self::new(suibase_home, user_home))
    }

    pub fn suibase_home(&self) -> &Path {
        &self.suibase_home
    }

    pub fn user_home(&self) -> &Path {
        &self.user_home
    }

    pub fn workdirs_dir(&self) -> PathBuf {
        self.suibase_home.join("workdirs")
    }

    pub fn workdir_dir(&self, workdir: &str) -> PathBuf {
        self.workdirs_dir().join(workdir)
    }

    pub fn common_dir(&self) -> PathBuf {
        self.workdir_dir(COMMON_WORKDIR)
    }

    pub fn user_bin_dir(&self) -> PathBuf {
        self.user_home.join(".local").join("bin")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.common_dir()
            .join(".cache")
            .join("precompiled_downloads")
    }

    pub fn download_dir(&self, assets_name: &str, branch: &str) -> PathBuf {
        self.cache_root().join(assets_name).join(branch)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.common_dir().join(".state")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    pub fn lock_path(&self, key: &str) -> PathBuf {
        self.locks_dir().join(format!("{key}.lock"))
    }

    pub fn user_config_path(&self) -> PathBuf {
        self.common_dir().join("sbapp.toml")
    }

    /// Absolute paths pass through; relative ones are anchored at the suibase home.
    pub fn resolve_hint(&self, hint: &str) -> PathBuf {
        if let Some(rest) = hint.strip_prefix("~/") {
            return self.user_home.join(rest);
        }
        let path = Path::new(hint);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.suibase_home.join(path)
        }
    }
}
