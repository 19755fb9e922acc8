//! Command-line entry point shared by daemons built on deskvisor.
//!
//! A daemon binary only supplies its [`Plugin`]:
//!
//! ```no_run
//! use deskvisor::{Runtime, TaskError};
//!
//! fn plugin(_rt: &Runtime) -> Result<(), TaskError> {
//!     Ok(())
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     deskvisor::cli::main_with(plugin)
//! }
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::core::{Plugin, Runtime};

/// Desktop event daemon.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file; defaults to $XDG_CONFIG_HOME/deskvisor/config.toml when present.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Root level applied to every target, the daemon's own included.
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Parses the command line, then runs `plugin` until shutdown.
pub fn main_with<P: Plugin>(plugin: P) -> ExitCode {
    run_cli(Cli::parse(), &plugin)
}

/// Runs `plugin` with already-parsed arguments.
pub fn run_cli<P: Plugin + ?Sized>(cli: Cli, plugin: &P) -> ExitCode {
    init_tracing(cli.verbose);

    let cfg = match Config::load(cli.config_file.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(cfg.blocking_threads_clamped())
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build the async runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "deskvisor starting");
    let runtime = Runtime::new(cfg);
    let outcome = rt.block_on(runtime.run(plugin));
    rt.shutdown_background();

    match outcome {
        Ok(()) => {
            info!("deskvisor stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            ExitCode::FAILURE
        }
    }
}
