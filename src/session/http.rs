//! HTTP page driver.
//!
//! Drives the remote site with a cookie-keeping `reqwest` client instead of
//! a real browser: the stream pages are server rendered, so plain requests
//! carrying the session cookie see the same content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::RwLock;

use super::driver::{BrowserDriver, DriverError, LoginForm};
use crate::storage::config::{NetworkSettings, RemoteSettings};

static USER_ID_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"user_id\s*[=:]\s*["']?(\d+)"#).expect("valid user id pattern")
});

static CSRF_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="csrfmiddlewaretoken"]"#).expect("valid csrf selector")
});

static USER_ID_ATTR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-user-id]").expect("valid user id selector"));

/// Page currently loaded in the driver.
#[derive(Debug, Clone)]
struct LoadedPage {
    url: String,
    content: String,
}

/// `reqwest`-backed [`BrowserDriver`].
pub struct HttpDriver {
    client: reqwest::Client,
    remote: RemoteSettings,
    current: RwLock<Option<LoadedPage>>,
    closed: AtomicBool,
}

/// Login endpoint JSON reply.
#[derive(Debug, serde::Deserialize)]
struct LoginReply {
    success: Option<bool>,
    error: Option<String>,
}

impl HttpDriver {
    /// Build a driver with a fresh cookie jar.
    pub fn connect(remote: &RemoteSettings, network: &NetworkSettings) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(remote.user_agent.clone())
            .timeout(Duration::from_secs(network.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| DriverError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            remote: remote.clone(),
            current: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    async fn current_page(&self) -> Result<LoadedPage, DriverError> {
        self.current.read().await.clone().ok_or(DriverError::NoPage)
    }
}

fn map_request_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::Timeout
    } else if let Some(status) = e.status() {
        DriverError::Status(status.as_u16())
    } else {
        DriverError::Request(e.to_string())
    }
}

/// CSRF token from the login form, if the page has one.
fn extract_csrf_token(content: &str) -> Option<String> {
    let document = Html::parse_document(content);
    let token = document
        .select(&CSRF_SELECTOR)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string);
    token
}

/// Profile id from an authenticated page.
pub fn extract_profile_id(content: &str) -> Option<String> {
    let from_attr = {
        let document = Html::parse_document(content);
        let id = document
            .select(&USER_ID_ATTR_SELECTOR)
            .filter_map(|e| e.value().attr("data-user-id"))
            .map(str::trim)
            .find(|id| !id.is_empty())
            .map(str::to_string);
        id
    };

    from_attr.or_else(|| {
        USER_ID_SCRIPT_RE
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

impl BrowserDriver for HttpDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;

        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(map_request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::Status(status.as_u16()));
        }

        let content = response.text().await.map_err(map_request_error)?;
        *self.current.write().await = Some(LoadedPage {
            url: url.to_string(),
            content,
        });

        Ok(())
    }

    async fn submit_login_form(&self, form: &LoginForm) -> Result<(), DriverError> {
        self.ensure_open()?;

        let page = self.current_page().await?;
        let token = extract_csrf_token(&page.content);
        if token.is_none() {
            tracing::debug!("No CSRF token on {}, posting without one", page.url);
        }

        let mut fields = vec![
            ("username", form.username.clone()),
            ("password", form.password.clone()),
            ("is_username", "1".to_string()),
            ("json", "1".to_string()),
        ];
        if let Some(token) = token {
            fields.push(("csrfmiddlewaretoken", token));
        }

        let response = self
            .client
            .post(self.remote.login_url())
            .header(reqwest::header::REFERER, page.url.as_str())
            .form(&fields)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DriverError::LoginRejected(format!("status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(DriverError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_request_error)?;
        if let Ok(reply) = serde_json::from_str::<LoginReply>(&body) {
            if reply.success == Some(false) {
                return Err(DriverError::LoginRejected(
                    reply.error.unwrap_or_else(|| "invalid credentials".to_string()),
                ));
            }
        }

        // Land on the signed-in home page so the profile id can be read.
        self.navigate(&self.remote.home_url()).await
    }

    async fn page_content(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        Ok(self.current_page().await?.content)
    }

    async fn profile_id(&self) -> Result<Option<String>, DriverError> {
        self.ensure_open()?;
        let page = self.current_page().await?;
        Ok(extract_profile_id(&page.content))
    }

    async fn quit(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *self.current.write().await = None;
        tracing::debug!("HTTP driver closed");
        Ok(())
    }
}
