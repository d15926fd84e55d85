//! Desktop notifications.
//!
//! Notifications are best effort: the platform helper is spawned and left
//! to run on its own, and a failure is the caller's to log, never to
//! propagate.

use thiserror::Error;
use tokio::process::Command;

/// Notification errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Desktop notifications are not supported on this platform")]
    Unsupported,

    #[error("No async runtime to supervise the notifier")]
    NoRuntime,

    #[error("Failed to launch notifier: {0}")]
    Launch(String),
}

/// Something that can tell the user a run finished.
pub trait Notifier: Send + Sync {
    /// Fire a notification without waiting for it to be shown.
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier backed by the platform's notification helper.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

/// Quote a string for an AppleScript literal.
fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Helper command for the current platform.
fn platform_command(title: &str, body: &str) -> Result<Command, NotifyError> {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("osascript");
        command.arg("-e").arg(format!(
            "display notification {} with title {}",
            applescript_quote(body),
            applescript_quote(title)
        ));
        Ok(command)
    } else if cfg!(any(
        target_os = "linux",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    )) {
        let mut command = Command::new("notify-send");
        command.arg(title).arg(body);
        Ok(command)
    } else {
        Err(NotifyError::Unsupported)
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let mut command = platform_command(title, body)?;
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let _guard = handle.enter();
        let mut child = command
            .spawn()
            .map_err(|e| NotifyError::Launch(e.to_string()))?;

        handle.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!("Notifier exited with {}", status),
                Err(e) => tracing::warn!("Notifier did not finish: {}", e),
            }
        });

        Ok(())
    }
}
