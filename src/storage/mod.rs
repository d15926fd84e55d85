//! Storage module for the local database and configuration.

pub mod config;
pub mod database;
pub mod persister;
pub mod schema;

pub use config::{AppConfig, ConfigError, RunArgs, RunConfig, SyncMode};
pub use database::{Database, DatabaseError, TableCounts};
pub use persister::{PersistError, PersistOutcome, Persister, WorkoutStatus};
