use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use sbapp_core::{AppRegistry, SuibaseLayout};
use sbapp_installer::CancelToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod completion;
mod flows;
mod http;
mod render;

use completion::{write_completions_script, CliCompletionShell};
use flows::{
    format_app_lines, load_apps_config, run_check, run_clean_cache, run_doctor, run_install,
    run_resolve, run_status,
};
use render::{render_error_line, resolve_output_style, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "sbapp", version)]
#[command(about = "Installs precompiled Suibase binaries from GitHub releases", long_about = None)]
pub(crate) struct Cli {
    #[arg(long, global = true, help = "Suibase installation directory (default: ~/suibase)")]
    suibase_home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "App definitions file (default: <suibase-home>/workdirs/common/sbapp.toml)"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Plain output without badges or progress bars")]
    plain: bool,
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "More diagnostics on stderr; repeat for trace output"
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct AppTarget {
    app: String,
    #[arg(long)]
    workdir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Install or update an app, building from source when no binary fits")]
    Install {
        #[command(flatten)]
        target: AppTarget,
        #[arg(long, help = "Install exactly this release tag")]
        force_tag: Option<String>,
        #[arg(long, help = "Skip precompiled binaries and build from source")]
        no_precompiled: bool,
    },
    #[command(about = "Show which release would be installed, without installing it")]
    Resolve {
        #[command(flatten)]
        target: AppTarget,
    },
    #[command(about = "Show installed and latest known versions")]
    Status {
        app: Option<String>,
        #[arg(long)]
        workdir: Option<String>,
    },
    #[command(about = "Record the newest available release as the latest version")]
    Check {
        #[command(flatten)]
        target: AppTarget,
    },
    #[command(about = "Prune old release archives from the download cache")]
    CleanCache {
        #[command(flatten)]
        target: AppTarget,
    },
    #[command(about = "List configured apps")]
    List,
    #[command(about = "Show host detection and the paths in use")]
    Doctor,
    #[command(about = "Print a shell completion script")]
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("SBAPP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// First interrupt cancels the running download or build; a second one exits.
fn handle_interrupt(cancel: &CancelToken) -> bool {
    if cancel.is_cancelled() {
        return true;
    }
    cancel.cancel();
    false
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if handle_interrupt(&cancel) {
            std::process::exit(130);
        }
        eprintln!("interrupted; stopping (press Ctrl-C again to quit now)");
    }) {
        warn!(error = %err, "failed to install interrupt handler");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let renderer = TerminalRenderer::from_style(resolve_output_style(cli.plain));
    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    match run_cli(cli, renderer, &cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error_line(renderer.style(), &format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli, renderer: TerminalRenderer, cancel: &CancelToken) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, &mut std::io::stdout().lock());
    }

    let layout = SuibaseLayout::from_env(cli.suibase_home.as_deref())?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| layout.user_config_path());
    let mut config = load_apps_config(&config_path, cli.config.is_some())?;

    match cli.command {
        Commands::Install {
            target,
            force_tag,
            no_precompiled,
        } => {
            config.apply_cli_overrides(&target.app, force_tag, no_precompiled)?;
            let mut registry = AppRegistry::new(config, layout);
            run_install(
                &mut registry,
                &target.app,
                target.workdir.as_deref(),
                renderer,
                cancel,
            )
        }
        Commands::Resolve { target } => {
            let mut registry = AppRegistry::new(config, layout);
            run_resolve(&mut registry, &target.app, target.workdir.as_deref(), renderer)
        }
        Commands::Status { app, workdir } => {
            let mut registry = AppRegistry::new(config, layout);
            run_status(&mut registry, app.as_deref(), workdir.as_deref(), renderer)
        }
        Commands::Check { target } => {
            let mut registry = AppRegistry::new(config, layout);
            run_check(&mut registry, &target.app, target.workdir.as_deref(), renderer)
        }
        Commands::CleanCache { target } => {
            let mut registry = AppRegistry::new(config, layout);
            run_clean_cache(&mut registry, &target.app, target.workdir.as_deref(), renderer)
        }
        Commands::List => {
            renderer.print_lines(&format_app_lines(&config));
            Ok(())
        }
        Commands::Doctor => run_doctor(&layout, &config, &config_path, renderer),
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests;
