//! Fitocracy Sync - workout history scraper
//!
//! Signs into a Fitocracy account, walks the profile's activity stream and
//! mirrors every workout into a local SQLite database as exercises, sets,
//! supersets and workouts. Re-running against unchanged data writes nothing.

pub mod app;
pub mod integrations;
pub mod session;
pub mod storage;
pub mod sync;
pub mod workouts;

// Re-export commonly used types
pub use app::{launch, LaunchError, LaunchHooks};
pub use session::{BrowserDriver, Credentials, HttpDriver};
pub use storage::config::{AppConfig, RunArgs};
pub use storage::database::Database;
pub use sync::{Orchestrator, RunState, RunSummary, SyncError};
