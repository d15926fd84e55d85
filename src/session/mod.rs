//! Session management.
//!
//! Logs into the remote service through a [`BrowserDriver`] and hands back
//! a [`SessionHandle`] bound to the signed-in profile. The handle owns the
//! driver session for the length of a run and must be closed on every exit
//! path; a failed login closes it before returning.

pub mod driver;
pub mod http;

use std::sync::Arc;

use thiserror::Error;

use crate::workouts::types::ProfileId;

pub use driver::{BrowserDriver, DriverError, LoginForm};
pub use http::HttpDriver;

/// Account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn login_form(&self) -> LoginForm {
        LoginForm {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication errors. All of them end a run before any page is read.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Signed in, but no profile id was found on the page")]
    MissingProfileId,

    #[error("Login failed: {0}")]
    Driver(#[from] DriverError),
}

/// Authenticated session bound to one profile.
pub struct SessionHandle<D: BrowserDriver> {
    driver: Arc<D>,
    profile_id: ProfileId,
    closed: bool,
}

impl<D: BrowserDriver> SessionHandle<D> {
    /// Profile the session is signed in as.
    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    /// Driver bound to this session.
    pub fn driver(&self) -> Arc<D> {
        Arc::clone(&self.driver)
    }

    /// Release the remote session.
    pub async fn close(mut self) -> Result<(), DriverError> {
        self.closed = true;
        tracing::debug!("Closing session for profile {}", self.profile_id);
        self.driver.quit().await
    }
}

impl<D: BrowserDriver> Drop for SessionHandle<D> {
    /// An unclosed handle (a run future dropped mid-flight) still quits the
    /// driver, on a spawned task when a runtime is available.
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(
                    "Session for profile {} dropped without being closed, quitting driver",
                    self.profile_id
                );
                let driver = Arc::clone(&self.driver);
                runtime.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        tracing::warn!("Failed to quit dropped session: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!(
                "Session for profile {} dropped outside a runtime, driver left open",
                self.profile_id
            ),
        }
    }
}

/// Signs in and produces session handles.
pub struct SessionManager<D: BrowserDriver> {
    driver: Arc<D>,
    home_url: String,
}

impl<D: BrowserDriver> SessionManager<D> {
    pub fn new(driver: Arc<D>, home_url: impl Into<String>) -> Self {
        Self {
            driver,
            home_url: home_url.into(),
        }
    }

    /// Submit the login form and capture the profile id.
    ///
    /// On failure the driver is shut down before the error is returned.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<SessionHandle<D>, AuthError> {
        tracing::info!("Signing in as {}", credentials.username);

        match self.login(credentials).await {
            Ok(profile_id) => {
                tracing::info!("Signed in, profile id {}", profile_id);
                Ok(SessionHandle {
                    driver: Arc::clone(&self.driver),
                    profile_id,
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(quit_err) = self.driver.quit().await {
                    tracing::warn!("Failed to close driver after login error: {}", quit_err);
                }
                Err(e)
            }
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<ProfileId, AuthError> {
        self.driver.navigate(&self.home_url).await?;

        match self.driver.submit_login_form(&credentials.login_form()).await {
            Ok(()) => {}
            Err(DriverError::LoginRejected(reason)) => {
                return Err(AuthError::InvalidCredentials(reason))
            }
            Err(e) => return Err(e.into()),
        }

        self.driver
            .profile_id()
            .await?
            .map(ProfileId::new)
            .filter(|id| !id.as_str().is_empty())
            .ok_or(AuthError::MissingProfileId)
    }
}
