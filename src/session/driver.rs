//! Page driver abstraction.
//!
//! The sync core only needs a handful of browser-like operations from the
//! remote side. Anything that can navigate, submit the login form, and hand
//! back rendered page content can drive a sync.

use std::future::Future;

use thiserror::Error;

/// Login form fields.
#[derive(Clone)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Driver errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Login form not found on {0}")]
    LoginFormMissing(String),

    #[error("No page loaded")]
    NoPage,

    #[error("Driver already closed")]
    Closed,

    #[error("Driver setup failed: {0}")]
    Setup(String),
}

impl DriverError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Request(_) | DriverError::Timeout => true,
            DriverError::Status(code) => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

/// Browser-like access to the remote service.
pub trait BrowserDriver: Send + Sync + 'static {
    /// Load a URL, making it the current page.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Fill in and submit the login form on the current page.
    fn submit_login_form(
        &self,
        form: &LoginForm,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Rendered content of the current page.
    fn page_content(&self) -> impl Future<Output = Result<String, DriverError>> + Send;

    /// Profile identifier of the signed-in user, if the current page shows one.
    fn profile_id(&self) -> impl Future<Output = Result<Option<String>, DriverError>> + Send;

    /// Tear down the session. Further calls fail with [`DriverError::Closed`].
    fn quit(&self) -> impl Future<Output = Result<(), DriverError>> + Send;
}
