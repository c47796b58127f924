use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    ConfigFile(PathBuf),
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "the GITHUB_TOKEN environment variable"),
            Self::ConfigFile(path) => write!(f, "github_token in {}", path.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PrecompError {
    #[error("precompiled binaries are not available for host os '{os}' arch '{arch}'")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to query {url} after {attempts} attempts: {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("GitHub rejected the token from {token_source}; it looks invalid or expired, fix or remove it and retry")]
    Auth { token_source: TokenSource },

    #[error("{}", rate_limited_message(.token_present))]
    RateLimited { token_present: bool },

    #[error("no precompiled release of '{assets_name}' found for {platform}-{arch} (branch '{branch}')")]
    NotFound {
        assets_name: String,
        branch: String,
        platform: String,
        arch: String,
    },

    #[error("force_tag '{tag}' set in {config_source} was not found for {platform}-{arch}")]
    ForcedTagNotFound {
        tag: String,
        config_source: String,
        platform: String,
        arch: String,
    },

    #[error("unsupported archive format: '{file_name}' (expected .tgz or .tar)")]
    UnsupportedArchive { file_name: String },

    #[error("failed to download or extract precompiled binary for branch {branch}; please re-run the command")]
    Extraction { branch: String },

    #[error("sha256 mismatch for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("invalid repository url '{url}': must start with {expected_origin}")]
    InvalidRepoUrl { url: String, expected_origin: String },
}

impl PrecompError {
    /// Whether the caller should fall back to building from source.
    pub fn triggers_build_fallback(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnsupportedPlatform { .. })
    }
}

fn rate_limited_message(token_present: &bool) -> String {
    if *token_present {
        "GitHub API rate limit exceeded; wait a while and retry".to_string()
    } else {
        "GitHub API rate limit exceeded; set GITHUB_TOKEN or github_token in sbapp.toml to raise the limit".to_string()
    }
}

pub fn precomp_error(err: &anyhow::Error) -> Option<&PrecompError> {
    err.chain().find_map(|cause| cause.downcast_ref::<PrecompError>())
}
