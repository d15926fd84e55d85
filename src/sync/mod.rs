//! Sync pipeline.
//!
//! Retry policy for network steps, the run orchestrator, and its summary.

pub mod orchestrator;
pub mod retry;
pub mod summary;

pub use orchestrator::{Orchestrator, RunState, SyncError};
pub use retry::{RetryFailure, RetryPolicy};
pub use summary::RunSummary;
