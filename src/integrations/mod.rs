//! External Integrations Module
//!
//! Desktop notification when a sync run completes.

pub mod notify;

pub use notify::{DesktopNotifier, NotifyError, Notifier};
