use super::*;
use clap::error::ErrorKind;
use clap::CommandFactory;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::flows::{format_doctor_lines, format_resolved_lines, format_status_line, install_summary};
use crate::render::{render_status_line, OutputStyle};
use sbapp_core::{AppDescriptor, AppsConfig, Arch, HostTarget, Origin, Platform, PrecompError, VersionRecord};
use sbapp_installer::{Downloader, InstallOutcome};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::http::{download_client_builder, HttpDownloader};
use sbapp_resolver::ResolvedRelease;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "sbapp-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ))
}

fn test_layout(root: &std::path::Path) -> SuibaseLayout {
    SuibaseLayout::new(root.join("suibase"), root.join("home"))
}

fn descriptor(root: &std::path::Path, app: &str, workdir: Option<&str>) -> Arc<AppDescriptor> {
    let config = AppsConfig::builtin().expect("must load built-in apps");
    let mut registry = AppRegistry::new(config, test_layout(root));
    registry.init(app, workdir).expect("must init descriptor")
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn install_parses_overrides() {
    let cli = Cli::try_parse_from([
        "sbapp",
        "install",
        "walrus",
        "--workdir",
        "testnet",
        "--force-tag",
        "testnet-v1.2.0",
        "--no-precompiled",
    ])
    .expect("command must parse");

    match cli.command {
        Commands::Install {
            target,
            force_tag,
            no_precompiled,
        } => {
            assert_eq!(target.app, "walrus");
            assert_eq!(target.workdir.as_deref(), Some("testnet"));
            assert_eq!(force_tag.as_deref(), Some("testnet-v1.2.0"));
            assert!(no_precompiled);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from(["sbapp", "status", "--plain", "-vv"]).expect("command must parse");

    assert!(cli.plain);
    assert_eq!(cli.verbose, 2);
    match cli.command {
        Commands::Status { app, workdir } => {
            assert!(app.is_none());
            assert!(workdir.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_requires_an_app_name() {
    let err = Cli::try_parse_from(["sbapp", "install"]).expect_err("app name is required");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn clean_cache_uses_kebab_case_name() {
    let cli = Cli::try_parse_from(["sbapp", "clean-cache", "sui", "--workdir", "devnet"])
        .expect("command must parse");
    match cli.command {
        Commands::CleanCache { target } => {
            assert_eq!(target.app, "sui");
            assert_eq!(target.workdir.as_deref(), Some("devnet"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn completions_script_names_the_binary() {
    let mut script = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut script)
        .expect("must generate completions");
    let script = String::from_utf8(script).expect("completion script must be utf-8");

    assert!(script.contains("sbapp"));
    assert!(script.contains("clean-cache"));
}

#[test]
fn status_lines_drop_badges_in_plain_mode() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "walrus 1.0.0"),
        "walrus 1.0.0"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "update available"),
        "[WARN] update available"
    );
    assert_eq!(render_status_line(OutputStyle::Rich, "none", "sui"), "[--] sui");
}

#[test]
fn error_lines_keep_a_prefix_in_both_styles() {
    assert_eq!(
        render_error_line(OutputStyle::Plain, "boom"),
        "error: boom"
    );
    assert_eq!(render_error_line(OutputStyle::Rich, "boom"), "[ERR] boom");
}

#[test]
fn explicit_config_path_must_exist() {
    let root = test_root();
    let err = load_apps_config(&root.join("missing.toml"), true)
        .expect_err("missing explicit config must fail");
    assert!(err.to_string().contains("config file not found"), "unexpected error: {err}");
}

#[test]
fn default_config_path_may_be_absent() {
    let root = test_root();
    let config = load_apps_config(&root.join("sbapp.toml"), false).expect("must fall back");

    assert!(config.app("walrus").is_some());
    let lines = format_app_lines(&config);
    assert!(lines
        .iter()
        .any(|line| line.starts_with("suibase-daemon scope=user bins=suibase-daemon")));
}

#[test]
fn status_line_flags_newer_latest_version() {
    let root = test_root();
    let desc = descriptor(&root, "walrus", Some("testnet"));
    let installed = VersionRecord::precompiled("1.0.0", "testnet");
    let latest = VersionRecord::precompiled("1.1.0", "testnet");

    let (status, line) = format_status_line(&desc, Some(&installed), Some(&latest));

    assert_eq!(status, "warn");
    assert_eq!(
        line,
        "walrus (testnet): 1.0.0 (precompiled, testnet), update available: 1.1.0"
    );
}

#[test]
fn status_line_is_ok_when_up_to_date() {
    let root = test_root();
    let desc = descriptor(&root, "walrus", Some("testnet"));
    let installed = VersionRecord::precompiled("1.1.0", "testnet");
    let latest = VersionRecord::precompiled("1.1.0", "testnet");

    let (status, line) = format_status_line(&desc, Some(&installed), Some(&latest));

    assert_eq!(status, "ok");
    assert_eq!(line, "walrus (testnet): 1.1.0 (precompiled, testnet)");
}

#[test]
fn status_line_reports_missing_install() {
    let root = test_root();
    let desc = descriptor(&root, "suibase-daemon", None);

    let (status, line) = format_status_line(&desc, None, None);

    assert_eq!(status, "none");
    assert_eq!(line, "suibase-daemon: not installed");
}

#[test]
fn install_summary_names_origin_and_tag() {
    let root = test_root();
    let desc = descriptor(&root, "walrus", Some("testnet"));
    let record = VersionRecord::precompiled("1.2.0", "testnet");

    let installed = install_summary(
        &desc,
        &InstallOutcome::Installed {
            record: record.clone(),
            tag: Some("testnet-v1.2.0".to_string()),
        },
    );
    assert!(
        installed.starts_with("installed walrus (testnet) 1.2.0 (precompiled, testnet-v1.2.0) into "),
        "unexpected summary: {installed}"
    );

    let already = install_summary(&desc, &InstallOutcome::AlreadyInstalled(record));
    assert_eq!(already, "already installed walrus (testnet) 1.2.0");
}

#[test]
fn install_summary_for_source_build_has_no_tag() {
    let root = test_root();
    let desc = descriptor(&root, "suibase-daemon", None);
    let mut record = VersionRecord::new("0.0.9");
    record.origin = Some(Origin::Built);

    let summary = install_summary(&desc, &InstallOutcome::Installed { record, tag: None });
    assert!(
        summary.starts_with("installed suibase-daemon 0.0.9 (built) into "),
        "unexpected summary: {summary}"
    );
}

#[test]
fn resolved_lines_include_digest_when_known() {
    let resolved = ResolvedRelease {
        tag_name: "testnet-v1.2.0".to_string(),
        semantic_version: "1.2.0".to_string(),
        download_url: "https://example.invalid/walrus-testnet-v1.2.0-ubuntu-x86_64.tgz".to_string(),
        digest: Some("ab".repeat(32)),
        host: HostTarget::new(Platform::Ubuntu, Arch::X86_64),
    };

    let lines = format_resolved_lines(&resolved);

    assert_eq!(lines[0], "tag: testnet-v1.2.0");
    assert_eq!(lines[1], "version: 1.2.0");
    assert_eq!(lines.len(), 5);
    assert!(lines[4].starts_with("sha256: abab"));
}

#[test]
fn doctor_reports_unsupported_host_and_missing_config() {
    let root = test_root();
    let layout = test_layout(&root);
    let config = AppsConfig::builtin().expect("must load built-in apps");
    let config_path = layout.user_config_path();

    let lines = format_doctor_lines(
        &layout,
        &config,
        &config_path,
        Err(PrecompError::UnsupportedPlatform {
            os: "plan9".to_string(),
            arch: "mips".to_string(),
        }),
    );

    assert!(lines[0].contains("plan9"), "unexpected host line: {}", lines[0]);
    assert!(lines
        .iter()
        .any(|line| line.ends_with("(absent, using built-in definitions)")));
    assert!(lines
        .iter()
        .any(|line| *line == format!("suibase home: {}", root.join("suibase").display())));
}

const SLOW_BODY: &[&[u8]] = &[b"sbap", b"p-ok"];
const WHOLE_BODY: &[&[u8]] = &[b"sbapp-ok"];

fn serve_archive_once(chunks: &'static [&'static [u8]], delay: Duration) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let addr = listener.local_addr().expect("must have local addr");
    let length: usize = chunks.iter().map(|chunk| chunk.len()).sum();
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept");
        let mut request = [0_u8; 2048];
        let _ = stream.read(&mut request);
        let headers =
            format!("HTTP/1.1 200 OK\r\nContent-Length: {length}\r\nConnection: close\r\n\r\n");
        if stream.write_all(headers.as_bytes()).is_err() {
            return;
        }
        for chunk in chunks {
            std::thread::sleep(delay);
            if stream.write_all(chunk).and_then(|()| stream.flush()).is_err() {
                return;
            }
        }
    });
    (format!("http://{addr}/archive.tgz"), server)
}

fn local_downloader(connect_timeout: Duration) -> HttpDownloader {
    let client = download_client_builder(connect_timeout)
        .no_proxy()
        .build()
        .expect("must build client");
    HttpDownloader::with_client(client, TerminalRenderer::from_style(OutputStyle::Plain))
}

#[test]
fn archive_downloads_may_outlast_the_connect_timeout() {
    let (url, server) = serve_archive_once(SLOW_BODY, Duration::from_millis(700));
    let downloader = local_downloader(Duration::from_secs(1));
    let root = test_root();
    std::fs::create_dir_all(&root).expect("must create test dir");
    let dest = root.join("walrus-testnet-v1.0.0-ubuntu-x86_64.tgz");

    downloader
        .download(&url, &dest)
        .expect("slow body must still download");

    assert_eq!(std::fs::read(&dest).expect("must read archive"), b"sbapp-ok");
    server.join().expect("server thread must finish");
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn cancelled_download_stops_before_reading_the_body() {
    let (url, server) = serve_archive_once(WHOLE_BODY, Duration::ZERO);
    let cancel = CancelToken::new();
    cancel.cancel();
    let downloader = local_downloader(Duration::from_secs(5)).with_cancel(&cancel);
    let root = test_root();
    std::fs::create_dir_all(&root).expect("must create test dir");

    let err = downloader
        .download(&url, &root.join("archive.tgz"))
        .expect_err("cancelled download must fail");

    assert!(err.to_string().contains("cancelled"), "unexpected error: {err}");
    server.join().expect("server thread must finish");
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn second_interrupt_requests_exit() {
    let cancel = CancelToken::new();

    assert!(!handle_interrupt(&cancel));
    assert!(cancel.is_cancelled());
    assert!(handle_interrupt(&cancel));
}
