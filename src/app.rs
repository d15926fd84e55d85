//! Run entry point shared by the binary and the integration tests.
//!
//! [`launch`] validates the command line before touching the filesystem or
//! the network. Only then is the configuration loaded, the store opened and
//! a driver connected for the [`Orchestrator`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::integrations::notify::Notifier;
use crate::session::{BrowserDriver, DriverError};
use crate::storage::config::{AppConfig, ConfigError, RunArgs, RunConfig};
use crate::storage::database::{Database, DatabaseError};
use crate::sync::{Orchestrator, RunSummary, SyncError};
use crate::workouts::parser::SelectorError;

/// Why a run could not start or did not finish.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bad command line. Nothing was opened.
    #[error("{0}")]
    Usage(#[source] ConfigError),

    #[error("Configuration error: {0}")]
    Config(#[source] ConfigError),

    #[error("Could not open database: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Could not start browser session: {0}")]
    Driver(#[from] DriverError),

    #[error("Bad markup configuration: {0}")]
    Markup(#[from] SelectorError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl LaunchError {
    pub fn is_usage(&self) -> bool {
        matches!(self, LaunchError::Usage(_))
    }

    /// Totals reached before a sync failure.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            LaunchError::Sync(e) => e.summary(),
            _ => None,
        }
    }
}

/// Optional hooks for a run.
#[derive(Default)]
pub struct LaunchHooks {
    /// Used when `sync.notify` is enabled
    pub notifier: Option<Box<dyn Notifier>>,
    /// Requests a stop between pages and workouts
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Validate `args`, open the store and run one sync.
///
/// `load_config` and `connect` are only called once the arguments are known
/// to be valid, so a usage error never reads a file or opens a connection.
pub async fn launch<D, L, F>(
    args: RunArgs,
    load_config: L,
    connect: F,
    hooks: LaunchHooks,
) -> Result<RunSummary, LaunchError>
where
    D: BrowserDriver,
    L: FnOnce(&RunConfig) -> Result<AppConfig, ConfigError>,
    F: FnOnce(&AppConfig) -> Result<D, DriverError>,
{
    let run = RunConfig::from_args(args).map_err(LaunchError::Usage)?;
    let config = load_config(&run).map_err(LaunchError::Config)?;

    let path = run.database_path();
    tracing::info!("Using database {}", path.display());
    let db = Database::open(&path)?;

    let driver = Arc::new(connect(&config)?);
    let notify = config.sync.notify;

    let mut orchestrator = Orchestrator::new(driver, db, config, run.mode)?;
    if notify {
        if let Some(notifier) = hooks.notifier {
            orchestrator = orchestrator.with_notifier(notifier);
        }
    }
    if let Some(cancel) = hooks.cancel {
        orchestrator = orchestrator.with_cancellation(cancel);
    }

    let summary = orchestrator.run(&run.credentials).await?;
    Ok(summary)
}

/// Receiver that turns true on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupted, stopping after the current workout");
                let _ = tx.send(true);
            }
            Err(e) => tracing::warn!("Could not listen for Ctrl-C: {}", e),
        }
        // Hold the sender so the receiver never sees a closed channel.
        std::future::pending::<()>().await;
    });

    rx
}
