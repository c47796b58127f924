use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Precompiled,
    Built,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precompiled => "precompiled",
            Self::Built => "built",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "precompiled" => Some(Self::Precompiled),
            "built" => Some(Self::Built),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRecord {
    pub version: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub commit_date: Option<String>,
    pub origin: Option<Origin>,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn precompiled(version: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            branch: non_empty(branch.into()),
            origin: Some(Origin::Precompiled),
            ..Self::default()
        }
    }

    /// `key: "value"` lines, `version` first, empty fields omitted.
    pub fn to_file_string(&self) -> String {
        let mut payload = format!("version: \"{}\"\n", self.version);
        if let Some(branch) = self.branch.as_deref().filter(|v| !v.is_empty()) {
            payload.push_str(&format!("branch: \"{branch}\"\n"));
        }
        if let Some(commit) = self.commit.as_deref().filter(|v| !v.is_empty()) {
            payload.push_str(&format!("commit: \"{commit}\"\n"));
        }
        if let Some(date) = self.commit_date.as_deref().filter(|v| !v.is_empty()) {
            payload.push_str(&format!("commit-date: \"{date}\"\n"));
        }
        if let Some(origin) = self.origin {
            payload.push_str(&format!("origin: \"{origin}\"\n"));
        }
        payload
    }

    /// Returns `None` when no usable `version` line is present.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut record = Self::default();
        let mut version = None;

        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim() {
                "version" => version = non_empty(strip_version_prefix(value).to_string()),
                "branch" => record.branch = non_empty(value.to_string()),
                "commit" => record.commit = non_empty(value.to_string()),
                "commit-date" => record.commit_date = non_empty(value.to_string()),
                "origin" => record.origin = Origin::parse(value),
                _ => {}
            }
        }

        record.version = version?;
        Some(record)
    }
}

/// Drops a leading non-digit prefix such as `v` or `testnet-v`.
pub fn strip_version_prefix(version: &str) -> &str {
    version.trim_start_matches(|ch: char| !ch.is_ascii_digit())
}

fn unquote(value: &str) -> &str {
    let value = value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value);
    value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
