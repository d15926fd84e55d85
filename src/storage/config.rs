//! Sync configuration.
//!
//! Two layers: [`AppConfig`] is the optional `config.toml` in the data
//! directory (remote endpoints, network tuning, markup selectors), and
//! [`RunConfig`] is the validated set of options for a single run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::Credentials;
use crate::sync::retry::RetryPolicy;
use crate::workouts::parser::MarkupRules;

/// Database name used when none is given.
pub const DEFAULT_DATABASE: &str = "fitocracy_dump";

/// Upper bound on pages fetched ahead of the one being processed.
pub const MAX_LOOKAHEAD: usize = 2;

/// Remote service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Site root, also the page the login form lives on
    pub base_url: String,
    /// Login form target
    pub login_path: String,
    /// Activity stream page, with `{offset}` and `{profile}` placeholders
    pub stream_path: String,
    /// Items per stream page
    pub page_size: usize,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.fitocracy.com".to_string(),
            login_path: "/accounts/login/".to_string(),
            stream_path: "/activity_stream/{offset}/?user_id={profile}&types=WORKOUT".to_string(),
            page_size: 15,
            user_agent: format!("fitocracy-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RemoteSettings {
    /// URL of the landing page.
    pub fn home_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// URL the login form posts to.
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }

    /// URL of one activity stream page.
    pub fn stream_url(&self, profile: &str, offset: usize) -> String {
        let path = self
            .stream_path
            .replace("{offset}", &offset.to_string())
            .replace("{profile}", profile);
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Network tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Timeout for a single fetch attempt
    pub request_timeout_secs: u64,
    /// Attempts per page before giving up
    pub max_attempts: u32,
    /// First backoff delay
    pub initial_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl NetworkSettings {
    /// Retry policy for page fetches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Pages fetched ahead while the current one is persisted
    pub lookahead: usize,
    /// Send a desktop notification when a run completes
    pub notify: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookahead: 1,
            notify: true,
        }
    }
}

impl SyncSettings {
    /// Lookahead clamped to the supported range.
    pub fn effective_lookahead(&self) -> usize {
        self.lookahead.min(MAX_LOOKAHEAD)
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteSettings,
    pub network: NetworkSettings,
    pub sync: SyncSettings,
    pub markup: MarkupRules,
}

/// How far back a run reads the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Stop at the stored high-water mark
    #[default]
    Incremental,
    /// Read the whole stream
    Full,
}

/// Unvalidated run options, as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub full: bool,
    pub data_dir: Option<PathBuf>,
}

/// Validated options for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub database: String,
    pub mode: SyncMode,
    pub data_dir: PathBuf,
}

impl RunConfig {
    /// Validate command line options. Performs no I/O.
    pub fn from_args(args: RunArgs) -> Result<Self, ConfigError> {
        let username = args
            .username
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingUsername)?;
        let password = args
            .password
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)?;

        let database = match args.database {
            Some(name) if name.trim().is_empty() => {
                return Err(ConfigError::InvalidDatabaseName(name))
            }
            Some(name) if name.contains(['/', '\\']) => {
                return Err(ConfigError::InvalidDatabaseName(name))
            }
            Some(name) => name.trim().to_string(),
            None => DEFAULT_DATABASE.to_string(),
        };

        Ok(Self {
            credentials: Credentials::new(username.trim(), password),
            database,
            mode: if args.full {
                SyncMode::Full
            } else {
                SyncMode::Incremental
            },
            data_dir: args.data_dir.unwrap_or_else(get_data_dir),
        })
    }

    /// Path of the SQLite file for this run.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.database))
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "fitocracy-sync", "FitocracySync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load configuration from a file. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("You must provide a username: -u username")]
    MissingUsername,

    #[error("You must provide a password: -p password")]
    MissingPassword,

    #[error("Invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
