mod archive;
mod config;
mod descriptor;
mod error;
mod host;
mod layout;
mod version_record;

pub use archive::{archive_file_name, extracted_dir_name, ArchiveType};
pub use config::{
    ApiToken, AppConfig, AppsConfig, BuildType, InstallScope, KnownBadConfig, SrcType,
};
pub use descriptor::{AppDescriptor, AppRegistry, AssetNameFilter};
pub use error::{precomp_error, PrecompError, TokenSource};
pub use host::{probe_host, probe_host_with, Arch, HostTarget, Platform};
pub use layout::{SuibaseLayout, COMMON_WORKDIR};
pub use version_record::{strip_version_prefix, Origin, VersionRecord};

#[cfg(test)]
mod tests;
