//! Fitocracy Sync - command line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fitocracy_sync::app::{cancel_on_ctrl_c, launch, LaunchError, LaunchHooks};
use fitocracy_sync::integrations::{DesktopNotifier, Notifier};
use fitocracy_sync::session::HttpDriver;
use fitocracy_sync::storage::config::{load_config_from, RunArgs};
use fitocracy_sync::sync::RunSummary;

#[derive(Parser)]
#[command(
    name = "fitocracy-sync",
    version,
    about = "Mirror your Fitocracy workout history into a local SQLite database",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Flags for the default `run` command
    #[command(flatten)]
    run: RunFlags,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the activity stream into the database (default)
    Run(RunFlags),
}

#[derive(Args, Debug, Default, PartialEq)]
struct RunFlags {
    /// Fitocracy username
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Fitocracy password
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Database name, stored as <NAME>.db in the data directory [default: fitocracy_dump]
    #[arg(short = 'd', long, value_name = "NAME")]
    database: Option<String>,

    /// Read the whole activity stream instead of stopping at the last sync
    #[arg(long)]
    full: bool,

    /// Data directory override
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file [default: <data dir>/config.toml]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip the desktop notification
    #[arg(long)]
    no_notify: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    /// Flags of the command to run; a bare invocation means `run`.
    fn into_run_flags(self) -> RunFlags {
        match self.command {
            Some(Command::Run(flags)) => flags,
            None => self.run,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let flags = Cli::parse().into_run_flags();

    let default_level = if flags.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting fitocracy-sync v{}", env!("CARGO_PKG_VERSION"));

    let args = RunArgs {
        username: flags.username,
        password: flags.password,
        database: flags.database,
        full: flags.full,
        data_dir: flags.data_dir,
    };
    let config_path = flags.config;
    let no_notify = flags.no_notify;

    let hooks = LaunchHooks {
        notifier: (!no_notify).then(|| Box::new(DesktopNotifier::new()) as Box<dyn Notifier>),
        cancel: Some(cancel_on_ctrl_c()),
    };

    let result = launch(
        args,
        |run| {
            let path = config_path.unwrap_or_else(|| run.data_dir.join("config.toml"));
            load_config_from(&path)
        },
        |config| HttpDriver::connect(&config.remote, &config.network),
        hooks,
    )
    .await;

    let report = Report::from_result(&result);
    for line in &report.stdout {
        println!("{}", line);
    }
    for line in &report.stderr {
        eprintln!("{}", line);
    }
    ExitCode::from(report.code)
}

/// What a finished launch prints, and its exit status.
#[derive(Debug, PartialEq)]
struct Report {
    code: u8,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl Report {
    fn from_result(result: &Result<RunSummary, LaunchError>) -> Self {
        match result {
            Ok(summary) => Self {
                code: 0,
                stdout: vec![summary.to_string()],
                stderr: Vec::new(),
            },
            // Usage messages go to stdout.
            Err(e) if e.is_usage() => Self {
                code: 2,
                stdout: vec![e.to_string()],
                stderr: Vec::new(),
            },
            Err(e) => {
                let mut stderr = vec![format!("Error: {}", e)];
                if let Some(summary) = e.summary() {
                    stderr.push(format!("Committed before the failure:\n{}", summary));
                }
                Self {
                    code: 1,
                    stdout: Vec::new(),
                    stderr,
                }
            }
        }
    }
}
