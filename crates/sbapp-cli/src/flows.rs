use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sbapp_core::{
    probe_host, AppDescriptor, AppRegistry, AppsConfig, HostTarget, InstallScope, Origin,
    PrecompError, SuibaseLayout, VersionRecord,
};
use sbapp_installer::{
    cleanup_cache, installed_record, latest_record, write_latest_record, AppInstaller, AppLock,
    ArtifactFetcher, CancelToken, CargoSourceBuilder, InstallOutcome, RETAINED_CACHE_ITEMS,
};
use sbapp_resolver::{version_cmp, Denylist, ReleaseResolver, ResolvedRelease};

use crate::http::{HttpDownloader, ReqwestTransport};
use crate::render::TerminalRenderer;

/// An explicit `--config` must exist; the default location is optional.
pub(crate) fn load_apps_config(path: &Path, explicit: bool) -> Result<AppsConfig> {
    if explicit && !path.exists() {
        return Err(anyhow!("config file not found: {}", path.display()));
    }
    AppsConfig::load(path)
}

fn network_timeout(config: &AppsConfig) -> Duration {
    Duration::from_secs(config.network_timeout_secs.max(1))
}

fn build_resolver(
    config: &AppsConfig,
    renderer: TerminalRenderer,
) -> Result<ReleaseResolver<ReqwestTransport>> {
    Ok(
        ReleaseResolver::new(ReqwestTransport::new(network_timeout(config))?)
            .with_token(config.api_token())
            .with_denylist(Denylist::from_config(&config.known_bad)?)
            .with_notice(move |line| renderer.print_status("step", line)),
    )
}

pub(crate) fn run_install(
    registry: &mut AppRegistry,
    app: &str,
    workdir: Option<&str>,
    renderer: TerminalRenderer,
    cancel: &CancelToken,
) -> Result<()> {
    let descriptor = registry.init(app, workdir)?;
    let config = registry.config();
    let resolver = build_resolver(config, renderer)?;
    let downloader = HttpDownloader::new(network_timeout(config), renderer)?.with_cancel(cancel);
    let fetcher = ArtifactFetcher::new(downloader)
        .with_notice(move |line| renderer.print_status("step", line));
    let builder = CargoSourceBuilder::new(cancel.clone());
    let installer = AppInstaller::new(registry.layout(), &resolver, &fetcher, &builder)
        .with_notice(|line| renderer.print_status("warn", line));

    renderer.print_section(&format!("install {}", descriptor.display_name()));
    let outcome = installer.install(&descriptor)?;
    renderer.print_status("ok", &install_summary(&descriptor, &outcome));
    Ok(())
}

pub(crate) fn install_summary(descriptor: &AppDescriptor, outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::AlreadyInstalled(record) => format!(
            "already installed {} {}",
            descriptor.display_name(),
            record.version
        ),
        InstallOutcome::Installed { record, tag } => {
            let origin = record.origin.map(Origin::as_str).unwrap_or("unknown");
            let detail = match tag {
                Some(tag) => format!("{origin}, {tag}"),
                None => origin.to_string(),
            };
            format!(
                "installed {} {} ({detail}) into {}",
                descriptor.display_name(),
                record.version,
                descriptor.local_bin_path.display()
            )
        }
    }
}

pub(crate) fn run_resolve(
    registry: &mut AppRegistry,
    app: &str,
    workdir: Option<&str>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let descriptor = registry.init(app, workdir)?;
    let resolver = build_resolver(registry.config(), renderer)?;
    let host = probe_host()?;
    let resolved = resolver.resolve(&descriptor, host)?;
    renderer.print_lines(&format_resolved_lines(&resolved));
    Ok(())
}

pub(crate) fn format_resolved_lines(resolved: &ResolvedRelease) -> Vec<String> {
    let mut lines = vec![
        format!("tag: {}", resolved.tag_name),
        format!("version: {}", resolved.semantic_version),
        format!("host: {}", resolved.host),
        format!("url: {}", resolved.download_url),
    ];
    if let Some(digest) = &resolved.digest {
        lines.push(format!("sha256: {digest}"));
    }
    lines
}

pub(crate) fn run_check(
    registry: &mut AppRegistry,
    app: &str,
    workdir: Option<&str>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let descriptor = registry.init(app, workdir)?;
    let resolver = build_resolver(registry.config(), renderer)?;
    let resolved = resolver.resolve(&descriptor, probe_host()?)?;

    let record = VersionRecord::precompiled(&resolved.semantic_version, &descriptor.repo_branch);
    {
        let _lock = AppLock::acquire(&registry.layout().lock_path(&descriptor.lock_key()))?;
        write_latest_record(&descriptor, &record)?;
    }

    let installed = installed_record(&descriptor)?;
    let (status, line) = format_status_line(&descriptor, installed.as_ref(), Some(&record));
    renderer.print_status(status, &line);
    Ok(())
}

pub(crate) fn run_status(
    registry: &mut AppRegistry,
    app: Option<&str>,
    workdir: Option<&str>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let names: Vec<String> = match app {
        Some(name) => vec![name.to_string()],
        None => registry
            .config()
            .apps
            .iter()
            .filter(|app| app.install_scope == InstallScope::User || workdir.is_some())
            .map(|app| app.name.clone())
            .collect(),
    };

    for name in names {
        let descriptor = registry.init(&name, workdir)?;
        let installed = installed_record(&descriptor)?;
        let latest = latest_record(&descriptor)?;
        let (status, line) = format_status_line(&descriptor, installed.as_ref(), latest.as_ref());
        renderer.print_status(status, &line);
    }
    Ok(())
}

pub(crate) fn format_status_line(
    descriptor: &AppDescriptor,
    installed: Option<&VersionRecord>,
    latest: Option<&VersionRecord>,
) -> (&'static str, String) {
    let name = descriptor.display_name();
    let Some(installed) = installed else {
        return match latest {
            Some(latest) => (
                "warn",
                format!("{name}: not installed (latest {})", latest.version),
            ),
            None => ("none", format!("{name}: not installed")),
        };
    };

    let mut detail = installed
        .origin
        .map(|origin| origin.as_str().to_string())
        .unwrap_or_else(|| "unknown origin".to_string());
    if let Some(branch) = &installed.branch {
        detail.push_str(", ");
        detail.push_str(branch);
    }

    match latest {
        Some(latest) if version_cmp(&latest.version, &installed.version) == Ordering::Greater => (
            "warn",
            format!(
                "{name}: {} ({detail}), update available: {}",
                installed.version, latest.version
            ),
        ),
        _ => ("ok", format!("{name}: {} ({detail})", installed.version)),
    }
}

pub(crate) fn run_clean_cache(
    registry: &mut AppRegistry,
    app: &str,
    workdir: Option<&str>,
    renderer: TerminalRenderer,
) -> Result<()> {
    let descriptor = registry.init(app, workdir)?;
    let _lock = AppLock::acquire(&registry.layout().lock_path(&descriptor.lock_key()))?;
    let removed = cleanup_cache(&descriptor.cache_path, RETAINED_CACHE_ITEMS);
    renderer.print_status(
        "ok",
        &format!(
            "removed {removed} cache item(s) from {}",
            descriptor.cache_path.display()
        ),
    );
    Ok(())
}

pub(crate) fn format_app_lines(config: &AppsConfig) -> Vec<String> {
    config
        .apps
        .iter()
        .map(|app| {
            let scope = match app.install_scope {
                InstallScope::User => "user",
                InstallScope::Workdir => "workdir",
            };
            format!(
                "{} scope={scope} bins={} repo={}",
                app.name,
                app.bin_names.join(","),
                app.repo_url
            )
        })
        .collect()
}

pub(crate) fn run_doctor(
    layout: &SuibaseLayout,
    config: &AppsConfig,
    config_path: &Path,
    renderer: TerminalRenderer,
) -> Result<()> {
    renderer.print_section("doctor");
    renderer.print_lines(&format_doctor_lines(layout, config, config_path, probe_host()));
    Ok(())
}

/// Never prints the token itself, only where it came from.
pub(crate) fn format_doctor_lines(
    layout: &SuibaseLayout,
    config: &AppsConfig,
    config_path: &Path,
    host: Result<HostTarget, PrecompError>,
) -> Vec<String> {
    let host_line = match host {
        Ok(host) => format!("host: {host}"),
        Err(err) => format!("host: {err}"),
    };
    let config_state = if config_path.exists() {
        "present"
    } else {
        "absent, using built-in definitions"
    };
    let token_line = match config.api_token() {
        Some(token) => format!("github token: from {}", token.source),
        None => "github token: not configured".to_string(),
    };

    vec![
        host_line,
        format!("suibase home: {}", layout.suibase_home().display()),
        format!("user bin: {}", layout.user_bin_dir().display()),
        format!("download cache: {}", layout.cache_root().display()),
        format!("locks: {}", layout.locks_dir().display()),
        format!("config: {} ({config_state})", config_path.display()),
        token_line,
        format!("network timeout: {}s", config.network_timeout_secs),
        format!("known bad releases: {}", config.known_bad.len()),
    ]
}
