//! Sync run orchestration.
//!
//! One [`Orchestrator::run`] signs in, walks the activity stream page by
//! page, and commits each workout date as soon as all of its entries have
//! been seen. The stream is newest first and a workout may straddle a page
//! boundary, so the oldest date on a page is held back until the next page
//! shows whether it continues.
//!
//! Workouts committed before a failure stay committed. The high-water mark
//! only advances when a run completes.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::watch;

use crate::integrations::notify::Notifier;
use crate::session::{AuthError, BrowserDriver, Credentials, SessionHandle, SessionManager};
use crate::storage::config::{AppConfig, SyncMode};
use crate::storage::database::{Database, DatabaseError, DATE_FORMAT};
use crate::storage::persister::{PersistError, Persister};
use crate::sync::summary::RunSummary;
use crate::workouts::fetcher::{FetchError, FetchMode, PageStream, WorkoutFetcher};
use crate::workouts::normalizer::{group_by_date, Normalizer};
use crate::workouts::parser::{RecordParser, SelectorError};
use crate::workouts::types::{PageCursor, ProfileId, RawEntry};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Authenticating,
    Fetching,
    Parsing,
    Persisting,
    Completed,
    Failed,
}

impl RunState {
    /// Whether the run has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// Why a run failed. Every variant past authentication carries the totals
/// reached before the failure; those workouts are already committed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetching stopped after {} page(s): {source}", .summary.pages_scraped)]
    Fetch {
        #[source]
        source: FetchError,
        summary: Box<RunSummary>,
    },

    #[error("Persisting stopped after {} workout(s): {source}", .summary.workouts_synced())]
    Persist {
        #[source]
        source: PersistError,
        summary: Box<RunSummary>,
    },

    #[error("Sync state unavailable: {source}")]
    Store {
        #[source]
        source: DatabaseError,
        summary: Box<RunSummary>,
    },

    #[error("Sync cancelled after {} workout(s)", .summary.workouts_synced())]
    Cancelled { summary: Box<RunSummary> },
}

impl SyncError {
    /// Totals reached before the failure, if the run got past sign-in.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            SyncError::Auth(_) => None,
            SyncError::Fetch { summary, .. }
            | SyncError::Persist { summary, .. }
            | SyncError::Store { summary, .. }
            | SyncError::Cancelled { summary } => Some(&**summary),
        }
    }
}

/// Failure inside the page loop, before the summary is attached.
enum Interrupted {
    Fetch(FetchError),
    Persist(PersistError),
    Store(DatabaseError),
    Cancelled,
}

impl Interrupted {
    fn with_summary(self, summary: &RunSummary) -> SyncError {
        let summary = Box::new(summary.clone());
        match self {
            Interrupted::Fetch(source) => SyncError::Fetch { source, summary },
            Interrupted::Persist(source) => SyncError::Persist { source, summary },
            Interrupted::Store(source) => SyncError::Store { source, summary },
            Interrupted::Cancelled => SyncError::Cancelled { summary },
        }
    }
}

/// Resolves once cancellation is requested. Never resolves if the sender
/// is gone without having asked.
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drives authentication, pagination, normalization and persistence.
pub struct Orchestrator<D: BrowserDriver> {
    driver: Arc<D>,
    db: Database,
    parser: Arc<RecordParser>,
    normalizer: Normalizer,
    config: AppConfig,
    mode: SyncMode,
    notifier: Option<Box<dyn Notifier>>,
    cancel: watch::Receiver<bool>,
    // Keeps the default channel open when no cancellation source is attached.
    _cancel_tx: Option<watch::Sender<bool>>,
    state: RunState,
}

impl<D: BrowserDriver> Orchestrator<D> {
    /// Create an orchestrator over an opened database.
    ///
    /// Fails only if the configured markup selectors do not compile.
    pub fn new(
        driver: Arc<D>,
        db: Database,
        config: AppConfig,
        mode: SyncMode,
    ) -> Result<Self, SelectorError> {
        let parser = RecordParser::new(&config.markup)?;
        let (tx, rx) = watch::channel(false);

        Ok(Self {
            driver,
            db,
            parser: Arc::new(parser),
            normalizer: Normalizer::new(),
            config,
            mode,
            notifier: None,
            cancel: rx,
            _cancel_tx: Some(tx),
            state: RunState::Idle,
        })
    }

    /// Notify through `notifier` when a run completes.
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Stop between pages and workouts once `cancel` turns true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self._cancel_tx = None;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    /// Run one sync for `credentials`.
    pub async fn run(&mut self, credentials: &Credentials) -> Result<RunSummary, SyncError> {
        self.state = RunState::Authenticating;

        let manager = SessionManager::new(Arc::clone(&self.driver), self.config.remote.home_url());
        let session = match manager.authenticate(credentials).await {
            Ok(session) => session,
            Err(e) => {
                self.state = RunState::Failed;
                tracing::error!("Sign-in failed: {}", e);
                return Err(e.into());
            }
        };

        let profile_id = session.profile_id().clone();
        let mut summary = RunSummary::new(profile_id.as_str());

        let result = self.sync_stream(&session, &mut summary).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close session: {}", e);
        }

        let result = result.and_then(|()| {
            self.db
                .record_sync(&profile_id, summary.newest_date)
                .map_err(Interrupted::Store)
        });

        match result {
            Ok(()) => {
                self.state = RunState::Completed;
                tracing::info!(
                    "Sync complete: {} workouts from {} pages ({} entries skipped)",
                    summary.workouts_synced(),
                    summary.pages_scraped,
                    summary.entries_skipped
                );
                self.send_notification(&summary);
                Ok(summary)
            }
            Err(interrupted) => {
                self.state = RunState::Failed;
                let error = interrupted.with_summary(&summary);
                tracing::error!("Sync failed: {}", error);
                Err(error)
            }
        }
    }

    async fn sync_stream(
        &mut self,
        session: &SessionHandle<D>,
        summary: &mut RunSummary,
    ) -> Result<(), Interrupted> {
        let profile_id = session.profile_id().clone();

        let mode = match self.mode {
            SyncMode::Full => FetchMode::Full,
            SyncMode::Incremental => match self
                .db
                .high_water_mark(&profile_id)
                .map_err(Interrupted::Store)?
            {
                Some(high_water_mark) => FetchMode::Incremental { high_water_mark },
                None => FetchMode::Full,
            },
        };
        tracing::info!("Reading activity stream ({:?})", mode);

        let fetcher = WorkoutFetcher::new(
            session,
            Arc::clone(&self.parser),
            self.config.remote.clone(),
            self.config.network.retry_policy(),
            mode,
            PageCursor::start(),
        );
        let mut pages = fetcher.pages(self.config.sync.effective_lookahead());

        let result = self.drain_pages(&mut pages, &profile_id, mode, summary).await;
        summary.termination = pages.shutdown().await;

        result
    }

    async fn drain_pages(
        &mut self,
        pages: &mut PageStream<D>,
        profile_id: &ProfileId,
        mode: FetchMode,
        summary: &mut RunSummary,
    ) -> Result<(), Interrupted> {
        let mut carried: Vec<RawEntry> = Vec::new();

        loop {
            self.state = RunState::Fetching;
            let next = tokio::select! {
                biased;
                _ = cancellation(&mut self.cancel) => return Err(Interrupted::Cancelled),
                next = pages.next() => next,
            };

            let page = match next {
                Some(Ok(page)) => page,
                Some(Err(e)) => return Err(Interrupted::Fetch(e)),
                None => break,
            };
            summary.pages_scraped += 1;

            self.state = RunState::Parsing;
            let parsed = self.parser.parse(&page);
            for error in &parsed.errors {
                tracing::warn!("Skipping entry: {}", error);
            }
            summary.entries_parsed += parsed.entries.len();
            summary.entries_skipped += parsed.errors.len();

            let mut entries = std::mem::take(&mut carried);
            entries.extend(parsed.entries);

            let mut workouts = group_by_date(entries);
            // The oldest date may continue on the next page.
            if let Some((_, tail)) = workouts.pop() {
                carried = tail;
            }

            self.state = RunState::Persisting;
            for (date, entries) in workouts {
                self.persist_workout(profile_id, date, &entries, summary)?;
                if *self.cancel.borrow() {
                    return Err(Interrupted::Cancelled);
                }
            }
        }

        if let Some(date) = carried.first().map(|e| e.date) {
            // Held-back entries at or before the mark may be missing the rest
            // of an already synced workout from the page that was never read.
            if let FetchMode::Incremental { high_water_mark } = mode {
                if date <= high_water_mark {
                    tracing::debug!("Leaving already synced workout {} as stored", date);
                    return Ok(());
                }
            }
            self.state = RunState::Persisting;
            self.persist_workout(profile_id, date, &carried, summary)?;
        }

        Ok(())
    }

    fn persist_workout(
        &mut self,
        profile_id: &ProfileId,
        date: NaiveDate,
        entries: &[RawEntry],
        summary: &mut RunSummary,
    ) -> Result<(), Interrupted> {
        let workout = self
            .normalizer
            .normalize(profile_id, date, entries, &self.db)
            .map_err(|source| {
                Interrupted::Persist(PersistError::Workout {
                    date: date.format(DATE_FORMAT).to_string(),
                    source,
                })
            })?;

        let outcome = Persister::new(&mut self.db)
            .persist(&workout)
            .map_err(Interrupted::Persist)?;

        for (name, id) in &outcome.new_exercises {
            self.normalizer.remember_exercise(name, *id);
        }

        tracing::debug!(
            "Workout {} {:?} ({} sets)",
            date,
            outcome.status,
            workout.set_count()
        );
        summary.record(date, &outcome);

        Ok(())
    }

    fn send_notification(&self, summary: &RunSummary) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify("Fitocracy sync complete", &summary.headline()) {
            tracing::warn!("Notification failed: {}", e);
        }
    }
}
