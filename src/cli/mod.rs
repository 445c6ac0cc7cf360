//! CLI entry point: argument parsing, logging/diagnostics setup, and
//! dispatch from a parsed [`Command`] to its execute function.

use std::env;
use std::sync::Arc;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::level_filters::LevelFilter;

use zana_consts::ENV_ZANA_REGISTRY_URL;
use zana_paths::ZanaHome;
use zana_process::SystemShell;
use zana_providers::dispatcher::{Dispatcher, DispatcherConfig};
use zana_registry::RegistryCache;

pub mod clean;
pub mod install;
pub mod list;
pub mod remove;
pub mod show;
pub mod sync;
pub mod update;

#[derive(Parser, Debug)]
#[command(name = "zana", version, about = "A cross-platform package manager for developer tools")]
#[clap(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    global: GlobalOptions,
}

#[derive(Parser, Debug)]
pub struct GlobalOptions {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// Whether to color output.
    #[clap(long, default_value = "auto", global = true, env = "ZANA_COLOR")]
    color: ColorOutput,

    /// Force a re-download/decompress of the registry bundle before running.
    #[clap(long, global = true)]
    refresh: bool,
}

impl GlobalOptions {
    fn log_level_filter(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (q, _) if q > 0 => LevelFilter::OFF,
            (_, 0) => LevelFilter::ERROR,
            (_, 1) => LevelFilter::WARN,
            (_, 2) => LevelFilter::INFO,
            (_, 3) => LevelFilter::DEBUG,
            (_, _) => LevelFilter::TRACE,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Default)]
pub enum ColorOutput {
    Always,
    Never,
    #[default]
    Auto,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Install a package at a version (or `latest`).
    Install(install::Args),
    /// Remove an installed package, or every package under a provider.
    Remove(remove::Args),
    /// Resolve the latest version and reinstall.
    Update(update::Args),
    /// Reconcile observed state with the lockfile for one or all providers.
    Sync(sync::Args),
    /// List installed packages, or every package the registry knows about.
    List(list::Args),
    /// Show registry metadata and installed state for one package.
    Show(show::Args),
    /// Remove and recreate a provider's install area.
    Clean(clean::Args),
}

pub async fn execute() -> miette::Result<()> {
    let args = Args::parse();
    set_console_colors(&args.global.color);

    let use_colors = console::colors_enabled_stderr();
    miette::set_hook(Box::new(move |_| {
        Box::new(miette::MietteHandlerOpts::default().color(use_colors).build())
    }))?;

    setup_logging(&args.global)?;

    let Some(command) = args.command else {
        std::process::exit(2);
    };

    execute_command(command, &args.global).await
}

pub async fn execute_command(command: Command, global: &GlobalOptions) -> miette::Result<()> {
    match command {
        Command::Install(cmd) => install::execute(cmd, global).await,
        Command::Remove(cmd) => remove::execute(cmd, global).await,
        Command::Update(cmd) => update::execute(cmd, global).await,
        Command::Sync(cmd) => sync::execute(cmd, global).await,
        Command::List(cmd) => list::execute(cmd, global).await,
        Command::Show(cmd) => show::execute(cmd, global).await,
        Command::Clean(cmd) => clean::execute(cmd, global).await,
    }
}

fn set_console_colors(color: &ColorOutput) {
    let color = match env::var("NO_COLOR") {
        Ok(_) => &ColorOutput::Never,
        Err(_) => color,
    };
    match color {
        ColorOutput::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorOutput::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorOutput::Auto => {}
    }
}

fn setup_logging(global: &GlobalOptions) -> miette::Result<()> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let level = global.log_level_filter();
    let cli_verbosity_set = global.verbose > 0 || global.quiet > 0;

    let env_filter = if cli_verbosity_set {
        EnvFilter::builder()
            .with_default_directive(level.into())
            .parse(format!("zana={level},zana_providers={level},zana_bin={level},zana_lockfile={level},zana_registry={level}"))
            .into_diagnostic()?
    } else {
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
            EnvFilter::new(format!("zana={level},zana_providers={level}"))
        })
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .into_diagnostic()?;

    Ok(())
}

/// Resolve `ZANA_HOME`, build the shared registry cache, and construct a
/// [`Dispatcher`] wired to the real [`SystemShell`]. Shared by every
/// subcommand.
pub(crate) async fn boot(global: &GlobalOptions) -> miette::Result<(ZanaHome, Arc<RegistryCache>, Dispatcher)> {
    let home = ZanaHome::from_env().into_diagnostic()?;
    let registry = Arc::new(RegistryCache::new(home.registry_cache_path()));
    let shell = Arc::new(SystemShell);
    let config = DispatcherConfig {
        registry_url_override: env::var(ENV_ZANA_REGISTRY_URL).ok(),
        force_registry_refresh: global.refresh,
    };
    let dispatcher = Dispatcher::new(shell, &home, registry.clone(), &config).into_diagnostic()?;
    Ok((home, registry, dispatcher))
}
