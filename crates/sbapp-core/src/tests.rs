use std::path::{Path, PathBuf};

use crate::*;

fn test_layout() -> SuibaseLayout {
    SuibaseLayout::new("/home/dev/suibase", "/home/dev")
}

fn walrus_config() -> AppConfig {
    AppConfig {
        name: "walrus".to_string(),
        assets_name: None,
        bin_names: vec!["walrus".to_string(), "site-builder".to_string()],
        repo_url: "https://github.com/MystenLabs/walrus.git".to_string(),
        repo_branch: None,
        force_tag: None,
        asset_name_filter: Some("branch".to_string()),
        install_scope: InstallScope::Workdir,
        precompiled: true,
        precompiled_path_hint: None,
        build_type: BuildType::Rust,
        src_type: SrcType::Repo,
        src_path: None,
        bin_subdir: None,
        extra_bin_dirs: Vec::new(),
    }
}

#[test]
fn archive_type_accepts_only_tgz_and_tar() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/walrus-testnet-v1.0.0-ubuntu-x86_64.tgz"),
        Some(ArchiveType::Tgz)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/a/sui.tar?download=1"),
        Some(ArchiveType::Tar)
    );
    assert_eq!(ArchiveType::infer_from_url("https://example.test/sui.zip"), None);
    assert_eq!(ArchiveType::infer_from_url("https://example.test/sui.tar.zst"), None);
    assert_eq!(ArchiveType::infer_from_url("https://example.test/"), None);
}

#[test]
fn extracted_dir_name_drops_archive_extension() {
    assert_eq!(
        extracted_dir_name("sui-testnet-v1.2.3-ubuntu-x86_64.tgz"),
        "sui-testnet-v1.2.3-ubuntu-x86_64"
    );
    assert_eq!(extracted_dir_name("bundle.TAR"), "bundle");
    assert_eq!(extracted_dir_name("no-extension"), "no-extension");
}

#[test]
fn archive_file_name_ignores_query_and_fragment() {
    assert_eq!(
        archive_file_name("https://example.test/dl/walrus.tgz?x=1#frag"),
        Some("walrus.tgz")
    );
    assert_eq!(archive_file_name("https://example.test/dl/"), None);
}

#[test]
fn probe_maps_linux_and_macos() {
    let host = probe_host_with("linux", "x86_64", || false).expect("linux x86_64");
    assert_eq!(host, HostTarget::new(Platform::Ubuntu, Arch::X86_64));

    let host = probe_host_with("linux", "aarch64", || false).expect("linux arm");
    assert_eq!(host.arch, Arch::Arm64);

    let host = probe_host_with("macos", "aarch64", || false).expect("apple silicon");
    assert_eq!(host, HostTarget::new(Platform::Macos, Arch::Arm64));
}

#[test]
fn probe_detects_translated_process_on_apple_silicon() {
    let host = probe_host_with("macos", "x86_64", || true).expect("rosetta");
    assert_eq!(host.arch, Arch::Arm64);

    let host = probe_host_with("macos", "x86_64", || false).expect("intel mac");
    assert_eq!(host.arch, Arch::X86_64);
}

#[test]
fn probe_only_consults_hardware_for_macos_x86_64() {
    let host = probe_host_with("linux", "x86_64", || panic!("must not probe hardware"))
        .expect("linux x86_64");
    assert_eq!(host.arch, Arch::X86_64);
}

#[test]
fn probe_rejects_unsupported_hosts() {
    let err = probe_host_with("windows", "x86_64", || false).expect_err("windows");
    assert!(matches!(err, PrecompError::UnsupportedPlatform { .. }));
    assert!(err.triggers_build_fallback());

    let err = probe_host_with("linux", "riscv64", || false).expect_err("riscv");
    assert!(err.to_string().contains("riscv64"));
}

#[test]
fn host_matches_asset_names_with_arch_aliases() {
    let linux_arm = HostTarget::new(Platform::Ubuntu, Arch::Arm64);
    assert!(linux_arm.matches_asset_name("sui-testnet-v1.0.0-ubuntu-aarch64.tgz"));
    assert!(linux_arm.matches_asset_name("walrus-testnet-v1.0.0-ubuntu-arm64.tgz"));
    assert!(!linux_arm.matches_asset_name("sui-testnet-v1.0.0-ubuntu-x86_64.tgz"));

    let mac_arm = HostTarget::new(Platform::Macos, Arch::Arm64);
    assert!(!mac_arm.matches_asset_name("sui-testnet-v1.0.0-macos-aarch64.tgz"));
    assert!(mac_arm.matches_asset_name("sui-testnet-v1.0.0-macos-arm64.tgz"));
}

#[test]
fn version_record_with_only_version_round_trips_cleanly() {
    let record = VersionRecord::new("1.2.3");
    let written = record.to_file_string();
    assert_eq!(written, "version: \"1.2.3\"\n");

    let parsed = VersionRecord::parse(&written).expect("must parse");
    assert_eq!(parsed.version, "1.2.3");
    assert!(parsed.branch.is_none());
    assert!(parsed.commit.is_none());
    assert!(parsed.commit_date.is_none());
    assert!(parsed.origin.is_none());
}

#[test]
fn version_record_writes_version_first_and_skips_empty_fields() {
    let record = VersionRecord {
        version: "1.0.0".to_string(),
        branch: Some("testnet".to_string()),
        commit: Some(String::new()),
        commit_date: None,
        origin: Some(Origin::Precompiled),
    };
    assert_eq!(
        record.to_file_string(),
        "version: \"1.0.0\"\nbranch: \"testnet\"\norigin: \"precompiled\"\n"
    );
}

#[test]
fn version_record_without_version_is_absent() {
    assert!(VersionRecord::parse("branch: \"testnet\"\norigin: \"built\"\n").is_none());
    assert!(VersionRecord::parse("").is_none());
    assert!(VersionRecord::parse("not yaml at all").is_none());
}

#[test]
fn version_record_parse_strips_tag_prefixes_and_quotes() {
    let parsed = VersionRecord::parse(
        "version: 'v1.4.0'\ncommit: \"abc123\"\ncommit-date: \"2024-05-01\"\norigin: \"built\"\n",
    )
    .expect("must parse");
    assert_eq!(parsed.version, "1.4.0");
    assert_eq!(parsed.commit.as_deref(), Some("abc123"));
    assert_eq!(parsed.commit_date.as_deref(), Some("2024-05-01"));
    assert_eq!(parsed.origin, Some(Origin::Built));
}

#[test]
fn strip_version_prefix_handles_branch_tags() {
    assert_eq!(strip_version_prefix("testnet-v1.2.3"), "1.2.3");
    assert_eq!(strip_version_prefix("v0.9.0"), "0.9.0");
    assert_eq!(strip_version_prefix("2.0.0"), "2.0.0");
}

#[test]
fn builtin_config_parses_and_defines_known_apps() {
    let config = AppsConfig::builtin().expect("built-in config must parse");
    for name in ["sui", "walrus", "site-builder", "suibase-daemon"] {
        assert!(config.app(name).is_some(), "missing built-in app {name}");
    }
    assert_eq!(config.network_timeout_secs, 120);
    assert_eq!(config.source_label(), "built-in app definitions");
}

#[test]
fn overlay_replaces_apps_by_name_and_appends_new_ones() {
    let mut config = AppsConfig::builtin().expect("built-in config must parse");
    let user_file = Path::new("/home/dev/suibase/workdirs/common/sbapp.toml");
    config
        .overlay_str(
            r#"
github_token = "ghp_example"
network_timeout_secs = 30

[[apps]]
name = "walrus"
bin_names = ["walrus"]
repo_url = "https://github.com/MystenLabs/walrus.git"
install_scope = "workdir"
force_tag = "testnet-v1.2.3"

[[apps]]
name = "custom"
bin_names = ["custom"]
repo_url = "https://github.com/example/custom"
install_scope = "user"

[[known_bad]]
tag = "testnet-v1.3.0"
platform = "ubuntu"
arch = "x86_64"
"#,
            user_file,
        )
        .expect("overlay must parse");

    let walrus = config.app("walrus").expect("walrus");
    assert_eq!(walrus.bin_names, vec!["walrus"]);
    assert_eq!(walrus.force_tag.as_deref(), Some("testnet-v1.2.3"));
    assert!(config.app("custom").is_some());
    assert_eq!(config.known_bad.len(), 1);
    assert_eq!(config.network_timeout_secs, 30);
    assert_eq!(config.force_tag_source("walrus"), user_file.display().to_string());
}

#[test]
fn overlay_rejects_invalid_definitions() {
    let mut config = AppsConfig::builtin().expect("built-in config must parse");
    let path = Path::new("sbapp.toml");

    let err = config
        .overlay_str(
            "[[apps]]\nname = \"x\"\nbin_names = []\nrepo_url = \"u\"\ninstall_scope = \"user\"\n",
            path,
        )
        .expect_err("empty bin list must fail");
    assert!(err.to_string().contains("at least one binary"));

    let err = config
        .overlay_str("[[known_bad]]\ntag = \"v1\"\nplatform = \"windows\"\n", path)
        .expect_err("unknown platform must fail");
    assert!(err.to_string().contains("windows"));
}

#[test]
fn api_token_prefers_environment() {
    let mut config = AppsConfig::builtin().expect("built-in config must parse");
    let path = PathBuf::from("/tmp/sbapp.toml");
    config
        .overlay_str("github_token = \"from-file\"\n", &path)
        .expect("overlay");

    let token = config
        .api_token_with(Some("from-env".to_string()))
        .expect("token");
    assert_eq!(token.value, "from-env");
    assert_eq!(token.source, TokenSource::Environment);

    let token = config.api_token_with(None).expect("token");
    assert_eq!(token.value, "from-file");
    assert_eq!(token.source, TokenSource::ConfigFile(path));

    let builtin = AppsConfig::builtin().expect("built-in");
    assert!(builtin.api_token_with(Some("  ".to_string())).is_none());
}

#[test]
fn cli_force_tag_is_attributed_to_the_option() {
    let mut config = AppsConfig::builtin().expect("built-in config must parse");
    config
        .apply_cli_overrides("sui", Some("testnet-v1.2.3".to_string()), true)
        .expect("override");
    let sui = config.app("sui").expect("sui");
    assert_eq!(sui.force_tag.as_deref(), Some("testnet-v1.2.3"));
    assert!(!sui.precompiled);
    assert_eq!(config.force_tag_source("sui"), "the --force-tag option");
    assert!(config.apply_cli_overrides("nope", None, false).is_err());
}

#[test]
fn descriptor_derives_workdir_paths() {
    let descriptor =
        AppDescriptor::from_config(&walrus_config(), Some("testnet"), &test_layout(), "cfg")
            .expect("descriptor");
    assert_eq!(descriptor.assets_name, "walrus");
    assert_eq!(descriptor.repo_branch, "testnet");
    assert_eq!(descriptor.asset_name_filter, AssetNameFilter::Branch);
    assert_eq!(
        descriptor.local_bin_path,
        PathBuf::from("/home/dev/suibase/workdirs/testnet/bin")
    );
    assert_eq!(
        descriptor.cache_path,
        PathBuf::from(
            "/home/dev/suibase/workdirs/common/.cache/precompiled_downloads/walrus/testnet"
        )
    );
    assert_eq!(
        descriptor.version_file_path(),
        PathBuf::from("/home/dev/suibase/workdirs/testnet/bin/walrus-version.yaml")
    );
    assert_eq!(descriptor.primary_bin(), "walrus");
    assert_eq!(descriptor.lock_key(), "testnet-walrus");
}

#[test]
fn descriptor_requires_workdir_for_workdir_scope() {
    let err = AppDescriptor::from_config(&walrus_config(), None, &test_layout(), "cfg")
        .expect_err("workdir required");
    assert!(err.to_string().contains("workdir"));
}

#[test]
fn user_scope_descriptor_uses_hint_and_ignores_workdir() {
    let mut app = walrus_config();
    app.install_scope = InstallScope::User;
    app.precompiled_path_hint = Some("workdirs/common/bin".to_string());
    app.extra_bin_dirs = vec!["~/.local/bin".to_string()];

    let descriptor = AppDescriptor::from_config(&app, Some("testnet"), &test_layout(), "cfg")
        .expect("descriptor");
    assert!(descriptor.workdir.is_none());
    assert_eq!(descriptor.repo_branch, "main");
    assert_eq!(
        descriptor.local_bin_path,
        PathBuf::from("/home/dev/suibase/workdirs/common/bin")
    );
    assert_eq!(
        descriptor.install_dirs(),
        vec![
            Path::new("/home/dev/suibase/workdirs/common/bin"),
            Path::new("/home/dev/.local/bin")
        ]
    );
    assert_eq!(descriptor.lock_key(), "common-walrus");
}

#[test]
fn asset_name_filter_modes() {
    assert_eq!(AssetNameFilter::from_config(None), AssetNameFilter::All);
    assert_eq!(AssetNameFilter::from_config(Some("")), AssetNameFilter::All);
    assert_eq!(
        AssetNameFilter::from_config(Some("branch")),
        AssetNameFilter::Branch
    );
    assert_eq!(
        AssetNameFilter::from_config(Some("suibase-daemon")),
        AssetNameFilter::Substring("suibase-daemon".to_string())
    );
}

#[test]
fn registry_init_is_idempotent() {
    let config = AppsConfig::builtin().expect("built-in config must parse");
    let mut registry = AppRegistry::new(config, test_layout());

    let first = registry.init("sui", Some("devnet")).expect("first init");
    let second = registry.init("sui", Some("devnet")).expect("second init");
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    let other = registry.init("sui", Some("testnet")).expect("other workdir");
    assert!(!std::sync::Arc::ptr_eq(&first, &other));

    let daemon_a = registry.init("suibase-daemon", Some("devnet")).expect("daemon");
    let daemon_b = registry.init("suibase-daemon", None).expect("daemon");
    assert!(std::sync::Arc::ptr_eq(&daemon_a, &daemon_b));

    assert!(registry.init("unknown", None).is_err());
}

#[test]
fn fallback_classification() {
    let not_found = PrecompError::NotFound {
        assets_name: "sui".to_string(),
        branch: "testnet".to_string(),
        platform: "ubuntu".to_string(),
        arch: "x86_64".to_string(),
    };
    assert!(not_found.triggers_build_fallback());

    let forced = PrecompError::ForcedTagNotFound {
        tag: "testnet-v9".to_string(),
        config_source: "sbapp.toml".to_string(),
        platform: "ubuntu".to_string(),
        arch: "x86_64".to_string(),
    };
    assert!(!forced.triggers_build_fallback());
    assert!(forced.to_string().contains("sbapp.toml"));

    let wrapped = anyhow::Error::new(not_found).context("install failed");
    assert!(precomp_error(&wrapped).is_some_and(PrecompError::triggers_build_fallback));
}

#[test]
fn rate_limit_message_suggests_token_only_when_missing() {
    let without = PrecompError::RateLimited {
        token_present: false,
    };
    assert!(without.to_string().contains("GITHUB_TOKEN"));
    let with = PrecompError::RateLimited {
        token_present: true,
    };
    assert!(!with.to_string().contains("GITHUB_TOKEN"));
}

#[test]
fn auth_error_names_token_source() {
    let err = PrecompError::Auth {
        token_source: TokenSource::ConfigFile(PathBuf::from("/x/sbapp.toml")),
    };
    assert!(err.to_string().contains("/x/sbapp.toml"));
}
