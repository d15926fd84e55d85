//! Scripted browser driver for sync runs without a network.
//!
//! Stream pages are served by index; any page past the scripted ones is an
//! empty page. Every call is counted so tests can prove what was (and was
//! not) requested.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use fitocracy_sync::session::{BrowserDriver, DriverError, LoginForm};
use fitocracy_sync::storage::config::RemoteSettings;

pub const PROFILE_ID: &str = "42";

const HOME_PAGE: &str = r#"<html><body data-user-id="42"><h1>Home</h1></body></html>"#;
const ANONYMOUS_PAGE: &str = r#"<html><body><form id="login"></form></body></html>"#;

/// Call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub navigate: AtomicUsize,
    pub login: AtomicUsize,
    pub page_content: AtomicUsize,
    pub profile_id: AtomicUsize,
    pub quit: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        Self::get(&self.navigate)
            + Self::get(&self.login)
            + Self::get(&self.page_content)
            + Self::get(&self.profile_id)
            + Self::get(&self.quit)
    }
}

pub struct FakeDriver {
    remote: RemoteSettings,
    pages: Vec<String>,
    stream_index: HashMap<String, usize>,
    reject_login: bool,
    hide_profile: bool,
    failing_page: Option<(usize, DriverError)>,
    signed_in: AtomicBool,
    closed: AtomicBool,
    current: Mutex<Option<String>>,
    fetched: Mutex<Vec<usize>>,
    pub calls: CallCounts,
}

impl FakeDriver {
    /// Driver serving `pages` as stream pages 0, 1, 2...
    pub fn new(pages: Vec<String>) -> Self {
        let remote = RemoteSettings::default();
        // Index a few pages past the script so the trailing empty pages resolve.
        let stream_index = (0..pages.len() + 8)
            .map(|i| (remote.stream_url(PROFILE_ID, i * remote.page_size), i))
            .collect();

        Self {
            remote,
            pages,
            stream_index,
            reject_login: false,
            hide_profile: false,
            failing_page: None,
            signed_in: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            current: Mutex::new(None),
            fetched: Mutex::new(Vec::new()),
            calls: CallCounts::default(),
        }
    }

    /// Reject every login attempt.
    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Sign in but never show a profile id.
    pub fn without_profile(mut self) -> Self {
        self.hide_profile = true;
        self
    }

    /// Fail every request for stream page `page`.
    pub fn failing_page(mut self, page: usize, error: DriverError) -> Self {
        self.failing_page = Some((page, error));
        self
    }

    /// Stream page indices requested, in order, retries included.
    pub fn fetched_pages(&self) -> Vec<usize> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.is_closed() {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }
}

impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.calls.navigate.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        let content = if let Some(&page) = self.stream_index.get(url) {
            self.fetched.lock().unwrap().push(page);
            if let Some((failing, error)) = &self.failing_page {
                if *failing == page {
                    return Err(error.clone());
                }
            }
            self.pages.get(page).cloned().unwrap_or_default()
        } else if url == self.remote.home_url() {
            if self.signed_in.load(Ordering::SeqCst) {
                HOME_PAGE.to_string()
            } else {
                ANONYMOUS_PAGE.to_string()
            }
        } else {
            return Err(DriverError::Status(404));
        };

        *self.current.lock().unwrap() = Some(content);
        Ok(())
    }

    async fn submit_login_form(&self, form: &LoginForm) -> Result<(), DriverError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        if self.reject_login || form.password.is_empty() {
            return Err(DriverError::LoginRejected("invalid credentials".to_string()));
        }

        self.signed_in.store(true, Ordering::SeqCst);
        *self.current.lock().unwrap() = Some(HOME_PAGE.to_string());
        Ok(())
    }

    async fn page_content(&self) -> Result<String, DriverError> {
        self.calls.page_content.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        self.current.lock().unwrap().clone().ok_or(DriverError::NoPage)
    }

    async fn profile_id(&self) -> Result<Option<String>, DriverError> {
        self.calls.profile_id.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;

        if self.hide_profile || !self.signed_in.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(PROFILE_ID.to_string()))
        }
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.calls.quit.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ========== Page markup ==========

/// One exercise block.
pub fn group(name: &str, lines: &[&str]) -> String {
    render_group(name, None, lines)
}

/// One exercise block inside superset `marker`.
pub fn superset_group(name: &str, marker: &str, lines: &[&str]) -> String {
    render_group(name, Some(marker), lines)
}

fn render_group(name: &str, marker: Option<&str>, lines: &[&str]) -> String {
    let attr = marker
        .map(|m| format!(r#" data-superset="{}""#, m))
        .unwrap_or_default();
    let sets: String = lines
        .iter()
        .map(|line| format!(r#"<div class="action-set">{}</div>"#, line))
        .collect();
    format!(
        r#"<div class="action-group"{}><span class="action-name">{}</span>{}</div>"#,
        attr, name, sets
    )
}

/// One stream item posted on `date`.
pub fn item(date: &str, groups: &[String]) -> String {
    format!(
        r#"<div class="stream-item"><time datetime="{}">{}</time>{}</div>"#,
        date,
        date,
        groups.concat()
    )
}

/// A stream page made of `items`.
pub fn page(items: &[String]) -> String {
    format!(r#"<div class="stream">{}</div>"#, items.concat())
}
