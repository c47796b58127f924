use std::fmt;
use std::process::Command;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::PrecompError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ubuntu,
    Macos,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu",
            Self::Macos => "macos",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ubuntu" | "linux" => Some(Self::Ubuntu),
            "macos" | "darwin" => Some(Self::Macos),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "arm64" | "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// Spellings accepted in asset file names. Linux arm builds are
    /// published as `aarch64`.
    pub fn asset_tokens(self, platform: Platform) -> &'static [&'static str] {
        match (self, platform) {
            (Self::X86_64, _) => &["x86_64"],
            (Self::Arm64, Platform::Ubuntu) => &["arm64", "aarch64"],
            (Self::Arm64, Platform::Macos) => &["arm64"],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTarget {
    pub platform: Platform,
    pub arch: Arch,
}

impl HostTarget {
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self { platform, arch }
    }

    pub fn matches_asset_name(&self, file_name: &str) -> bool {
        file_name.contains(self.platform.as_str())
            && self
                .arch
                .asset_tokens(self.platform)
                .iter()
                .any(|token| file_name.contains(token))
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.arch)
    }
}

static HOST: OnceLock<Result<HostTarget, (String, String)>> = OnceLock::new();

pub fn probe_host() -> Result<HostTarget, PrecompError> {
    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    HOST.get_or_init(|| {
        probe_host_with(os, arch, macos_hw_is_arm64)
            .map_err(|_| (os.to_string(), arch.to_string()))
    })
    .clone()
    .map_err(|(os, arch)| PrecompError::UnsupportedPlatform { os, arch })
}

/// Maps an os/arch pair onto asset tokens. On macOS an x86_64 process may be
/// running translated on Apple Silicon, so `hw_is_arm64` is consulted.
pub fn probe_host_with<F>(os: &str, arch: &str, hw_is_arm64: F) -> Result<HostTarget, PrecompError>
where
    F: FnOnce() -> bool,
{
    let unsupported = || PrecompError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let platform = match os {
        "linux" => Platform::Ubuntu,
        "macos" | "darwin" => Platform::Macos,
        _ => return Err(unsupported()),
    };

    let arch = match (platform, arch) {
        (Platform::Ubuntu, "x86_64") => Arch::X86_64,
        (Platform::Ubuntu, "aarch64" | "arm64") => Arch::Arm64,
        (Platform::Macos, "aarch64" | "arm64") => Arch::Arm64,
        (Platform::Macos, "x86_64") => {
            if hw_is_arm64() {
                debug!("x86_64 process on arm64 hardware; using arm64 assets");
                Arch::Arm64
            } else {
                Arch::X86_64
            }
        }
        _ => return Err(unsupported()),
    };

    Ok(HostTarget::new(platform, arch))
}

fn macos_hw_is_arm64() -> bool {
    Command::new("sysctl")
        .arg("-n")
        .arg("hw.optional.arm64")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .is_some_and(|output| String::from_utf8_lossy(&output.stdout).trim() == "1")
}
