use anyhow::{anyhow, Result};
use sbapp_core::{Arch, HostTarget, KnownBadConfig, Platform};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownBadRelease {
    pub tag: String,
    pub platform: Option<Platform>,
    pub arch: Option<Arch>,
    pub reason: Option<String>,
}

impl KnownBadRelease {
    pub fn matches(&self, host: HostTarget, tag: &str) -> bool {
        self.tag == tag
            && self.platform.is_none_or(|platform| platform == host.platform)
            && self.arch.is_none_or(|arch| arch == host.arch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    entries: Vec<KnownBadRelease>,
}

impl Denylist {
    pub fn new(entries: Vec<KnownBadRelease>) -> Self {
        Self { entries }
    }

    pub fn from_config(entries: &[KnownBadConfig]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let platform = entry
                .platform
                .as_deref()
                .map(|value| {
                    Platform::parse(value)
                        .ok_or_else(|| anyhow!("unknown platform '{value}' in known_bad"))
                })
                .transpose()?;
            let arch = entry
                .arch
                .as_deref()
                .map(|value| {
                    Arch::parse(value).ok_or_else(|| anyhow!("unknown arch '{value}' in known_bad"))
                })
                .transpose()?;
            parsed.push(KnownBadRelease {
                tag: entry.tag.trim().to_string(),
                platform,
                arch,
                reason: entry.reason.clone(),
            });
        }
        Ok(Self::new(parsed))
    }

    pub fn find(&self, host: HostTarget, tag: &str) -> Option<&KnownBadRelease> {
        self.entries.iter().find(|entry| entry.matches(host, tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
