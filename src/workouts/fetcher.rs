//! Activity stream pagination.
//!
//! [`WorkoutFetcher`] walks the signed-in profile's stream one page at a
//! time, newest first, and stops on an empty page or, in incremental mode,
//! on a page with nothing newer than the high-water mark. The stop check
//! runs before the next page is requested, so nothing past that point is
//! ever fetched.
//!
//! [`PageStream`] optionally moves fetching onto its own task so the next
//! page (or two) is downloaded while the current one is persisted. Pages
//! are still handed over strictly in stream order.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::{BrowserDriver, DriverError, SessionHandle};
use crate::storage::config::{RemoteSettings, MAX_LOOKAHEAD};
use crate::sync::retry::RetryPolicy;
use crate::workouts::parser::RecordParser;
use crate::workouts::types::{PageCursor, ProfileId, RawPage};

/// Fetch errors. Transient failures are retried before one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("page {page}: network error after {attempts} attempt(s): {source}")]
    Network {
        page: usize,
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("page fetcher stopped unexpectedly")]
    Aborted,
}

/// Which pages to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Whole stream
    Full,
    /// Stop at the first page with nothing after this date
    Incremental { high_water_mark: NaiveDate },
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The stream ran out
    EmptyPage,
    /// A page held nothing newer than the high-water mark
    HighWaterMark(NaiveDate),
}

/// Sequential page fetcher for one session.
pub struct WorkoutFetcher<D: BrowserDriver> {
    driver: Arc<D>,
    parser: Arc<RecordParser>,
    remote: RemoteSettings,
    retry: RetryPolicy,
    profile_id: ProfileId,
    mode: FetchMode,
    cursor: PageCursor,
    termination: Option<Termination>,
    pages_fetched: usize,
}

impl<D: BrowserDriver> WorkoutFetcher<D> {
    /// Fetcher starting at `cursor` in the session's stream.
    pub fn new(
        session: &SessionHandle<D>,
        parser: Arc<RecordParser>,
        remote: RemoteSettings,
        retry: RetryPolicy,
        mode: FetchMode,
        cursor: PageCursor,
    ) -> Self {
        Self {
            driver: session.driver(),
            parser,
            remote,
            retry,
            profile_id: session.profile_id().clone(),
            mode,
            cursor,
            termination: None,
            pages_fetched: 0,
        }
    }

    /// Why fetching stopped, once it has.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Pages requested so far, terminal page included.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once the stream is done.
    pub async fn next_page(&mut self) -> Result<Option<RawPage>, FetchError> {
        if self.termination.is_some() {
            return Ok(None);
        }

        let cursor = self.cursor;
        let url = self
            .remote
            .stream_url(self.profile_id.as_str(), cursor.offset(self.remote.page_size));
        let label = format!("Fetch of page {}", cursor.page);

        let driver = self.driver.as_ref();
        let target = url.as_str();
        let content = self
            .retry
            .run(&label, move || async move {
                driver.navigate(target).await?;
                driver.page_content().await
            })
            .await
            .map_err(|failure| FetchError::Network {
                page: cursor.page,
                attempts: failure.attempts,
                source: failure.last,
            })?;

        self.pages_fetched += 1;
        let page = RawPage {
            cursor,
            url,
            content,
        };

        if self.parser.is_empty_page(&page) {
            tracing::info!("Page {} is empty, end of stream", cursor.page);
            self.termination = Some(Termination::EmptyPage);
            return Ok(None);
        }

        if let FetchMode::Incremental { high_water_mark } = self.mode {
            if let Some(newest) = self.parser.newest_date(&page) {
                if newest <= high_water_mark {
                    tracing::info!(
                        "Page {} has nothing after {}, stopping",
                        cursor.page,
                        high_water_mark
                    );
                    self.termination = Some(Termination::HighWaterMark(high_water_mark));
                    return Ok(None);
                }
            }
        }

        tracing::debug!("Fetched page {} ({} bytes)", cursor.page, page.content.len());
        self.cursor = cursor.next();

        Ok(Some(page))
    }

    /// Lazy stream of pages. Ends after the terminal page or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<RawPage, FetchError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut fetcher = state?;
            match fetcher.next_page().await {
                Ok(Some(page)) => Some((Ok(page), Some(fetcher))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<D: BrowserDriver> WorkoutFetcher<D> {
    /// Turn the fetcher into a page source with up to `lookahead` pages in
    /// flight ahead of the consumer. Zero fetches on demand.
    pub fn pages(self, lookahead: usize) -> PageStream<D> {
        let depth = lookahead.min(MAX_LOOKAHEAD);
        if depth == 0 {
            return PageStream::Direct(self);
        }

        let (tx, rx) = mpsc::channel(depth);
        let mut fetcher = self;

        let task = tokio::spawn(async move {
            loop {
                // Take a slot before fetching so at most `depth` pages wait.
                let Ok(permit) = tx.reserve().await else {
                    break;
                };
                match fetcher.next_page().await {
                    Ok(Some(page)) => permit.send(Ok(page)),
                    Ok(None) => break,
                    Err(e) => {
                        permit.send(Err(e));
                        break;
                    }
                }
            }
            fetcher.termination()
        });

        PageStream::Prefetch { rx, task }
    }
}

/// Ordered page source handed to the orchestrator.
pub enum PageStream<D: BrowserDriver> {
    /// Fetch each page when asked for it
    Direct(WorkoutFetcher<D>),
    /// Background task fetching ahead into a bounded channel
    Prefetch {
        rx: mpsc::Receiver<Result<RawPage, FetchError>>,
        task: JoinHandle<Option<Termination>>,
    },
}

impl<D: BrowserDriver> PageStream<D> {
    /// Next page in stream order; `None` once the stream is done.
    pub async fn next(&mut self) -> Option<Result<RawPage, FetchError>> {
        match self {
            PageStream::Direct(fetcher) => fetcher.next_page().await.transpose(),
            PageStream::Prefetch { rx, .. } => rx.recv().await,
        }
    }

    /// Stop fetching and report why the stream ended, if it did.
    pub async fn shutdown(self) -> Option<Termination> {
        match self {
            PageStream::Direct(fetcher) => fetcher.termination(),
            PageStream::Prefetch { rx, task } => {
                drop(rx);
                if !task.is_finished() {
                    task.abort();
                }
                match task.await {
                    Ok(termination) => termination,
                    Err(e) if e.is_cancelled() => None,
                    Err(e) => {
                        tracing::warn!("Page fetch task failed: {}", e);
                        None
                    }
                }
            }
        }
    }
}
