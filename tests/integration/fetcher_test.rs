//! Pagination against a scripted stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::StreamExt;

use fitocracy_sync::session::{Credentials, SessionHandle, SessionManager};
use fitocracy_sync::storage::config::RemoteSettings;
use fitocracy_sync::sync::RetryPolicy;
use fitocracy_sync::workouts::fetcher::{FetchError, FetchMode, Termination, WorkoutFetcher};
use fitocracy_sync::workouts::parser::{MarkupRules, RecordParser};
use fitocracy_sync::workouts::types::PageCursor;

use crate::fake_driver::{group, item, page, FakeDriver};

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        attempt_timeout: Duration::from_secs(5),
    }
}

async fn signed_in(driver: &Arc<FakeDriver>) -> SessionHandle<FakeDriver> {
    let remote = RemoteSettings::default();
    SessionManager::new(Arc::clone(driver), remote.home_url())
        .authenticate(&Credentials::new("lifter", "secret"))
        .await
        .expect("login succeeds")
}

fn fetcher(session: &SessionHandle<FakeDriver>, mode: FetchMode) -> WorkoutFetcher<FakeDriver> {
    let parser = RecordParser::new(&MarkupRules::default()).unwrap();
    WorkoutFetcher::new(
        session,
        Arc::new(parser),
        RemoteSettings::default(),
        quick_retry(),
        mode,
        PageCursor::start(),
    )
}

fn three_pages() -> Vec<String> {
    vec![
        page(&[item("2024-03-01", &[group("Squat", &["5 reps"])])]),
        page(&[item("2024-02-01", &[group("Squat", &["5 reps"])])]),
        page(&[item("2024-01-01", &[group("Squat", &["5 reps"])])]),
    ]
}

#[tokio::test]
async fn test_stream_yields_pages_in_order_until_empty() {
    let driver = Arc::new(FakeDriver::new(three_pages()));
    let session = signed_in(&driver).await;

    let pages: Vec<_> = fetcher(&session, FetchMode::Full)
        .into_stream()
        .collect()
        .await;

    let cursors: Vec<usize> = pages
        .into_iter()
        .map(|p| p.expect("page fetched").cursor.page)
        .collect();
    assert_eq!(cursors, vec![0, 1, 2]);
    // The empty fourth page ends the stream.
    assert_eq!(driver.fetched_pages(), vec![0, 1, 2, 3]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_incremental_fetch_stops_before_old_page() {
    let driver = Arc::new(FakeDriver::new(three_pages()));
    let session = signed_in(&driver).await;
    let mark = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

    let mut fetcher = fetcher(&session, FetchMode::Incremental { high_water_mark: mark });
    let first = fetcher.next_page().await.unwrap().expect("newer page");
    assert_eq!(first.cursor.page, 0);
    assert!(fetcher.next_page().await.unwrap().is_none());
    assert!(fetcher.next_page().await.unwrap().is_none());

    assert_eq!(fetcher.termination(), Some(Termination::HighWaterMark(mark)));
    assert_eq!(fetcher.pages_fetched(), 2);
    assert_eq!(driver.fetched_pages(), vec![0, 1]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_stream_ends_after_first_error() {
    let driver = Arc::new(
        FakeDriver::new(three_pages())
            .failing_page(1, fitocracy_sync::session::DriverError::Status(503)),
    );
    let session = signed_in(&driver).await;

    let pages: Vec<_> = fetcher(&session, FetchMode::Full)
        .into_stream()
        .collect()
        .await;

    assert_eq!(pages.len(), 2);
    assert!(pages[0].is_ok());
    match &pages[1] {
        Err(FetchError::Network { page, attempts, .. }) => {
            assert_eq!(*page, 1);
            assert_eq!(*attempts, 2);
        }
        other => panic!("expected a network error, got {:?}", other.as_ref().map(|p| p.cursor)),
    }
    assert_eq!(driver.fetched_pages(), vec![0, 1, 1]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_prefetch_matches_direct_order() {
    for lookahead in 0..=3 {
        let driver = Arc::new(FakeDriver::new(three_pages()));
        let session = signed_in(&driver).await;

        let mut pages = fetcher(&session, FetchMode::Full).pages(lookahead);
        let mut seen = Vec::new();
        while let Some(result) = pages.next().await {
            seen.push(result.unwrap().cursor.page);
        }

        assert_eq!(seen, vec![0, 1, 2], "lookahead {}", lookahead);
        assert_eq!(pages.shutdown().await, Some(Termination::EmptyPage));

        session.close().await.unwrap();
    }
}
