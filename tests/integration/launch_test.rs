//! Command line validation and the full launch path.

use std::cell::Cell;

use fitocracy_sync::app::{launch, LaunchError, LaunchHooks};
use fitocracy_sync::session::DriverError;
use fitocracy_sync::storage::config::{AppConfig, ConfigError, RunArgs, RunConfig};
use fitocracy_sync::storage::database::Database;

use crate::fake_driver::{group, item, page, FakeDriver};

fn args(username: Option<&str>, password: Option<&str>, dir: &std::path::Path) -> RunArgs {
    RunArgs {
        username: username.map(str::to_string),
        password: password.map(str::to_string),
        database: None,
        full: false,
        data_dir: Some(dir.to_path_buf()),
    }
}

fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.notify = false;
    config.network.initial_backoff_ms = 1;
    config
}

/// Launch and report whether the config loader or the driver were touched.
async fn launch_tracking(run_args: RunArgs) -> (Result<(), LaunchError>, bool, bool) {
    let loaded = Cell::new(false);
    let connected = Cell::new(false);

    let result = launch(
        run_args,
        |_: &RunConfig| -> Result<AppConfig, ConfigError> {
            loaded.set(true);
            Ok(quiet_config())
        },
        |_: &AppConfig| -> Result<FakeDriver, DriverError> {
            connected.set(true);
            Ok(FakeDriver::new(Vec::new()))
        },
        LaunchHooks::default(),
    )
    .await
    .map(|_| ());

    (result, loaded.get(), connected.get())
}

#[tokio::test]
async fn test_missing_username_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let (result, loaded, connected) = launch_tracking(args(None, Some("secret"), dir.path())).await;

    let err = result.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "You must provide a username: -u username");
    assert!(!loaded);
    assert!(!connected);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_password_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let (result, loaded, connected) = launch_tracking(args(Some("lifter"), None, dir.path())).await;

    let err = result.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "You must provide a password: -p password");
    assert!(!loaded);
    assert!(!connected);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_username_is_checked_before_password() {
    let dir = tempfile::tempdir().unwrap();

    let (result, _, _) = launch_tracking(args(Some("   "), None, dir.path())).await;

    assert_eq!(
        result.unwrap_err().to_string(),
        "You must provide a username: -u username"
    );
}

#[tokio::test]
async fn test_bad_config_stops_before_database() {
    let dir = tempfile::tempdir().unwrap();

    let result = launch(
        args(Some("lifter"), Some("secret"), dir.path()),
        |_: &RunConfig| -> Result<AppConfig, ConfigError> {
            Err(ConfigError::ParseError("expected `=`".to_string()))
        },
        |_: &AppConfig| Ok(FakeDriver::new(Vec::new())),
        LaunchHooks::default(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, LaunchError::Config(_)));
    assert!(!err.is_usage());
    assert!(!dir.path().join("fitocracy_dump.db").exists());
}

#[tokio::test]
async fn test_launch_writes_named_database() {
    let dir = tempfile::tempdir().unwrap();
    let stream = vec![page(&[item(
        "2024-01-01",
        &[group("Squat", &["5 reps", "3 reps"])],
    )])];
    let mut run_args = args(Some("lifter"), Some("secret"), dir.path());
    run_args.database = Some("mine".to_string());

    let summary = launch(
        run_args,
        |run: &RunConfig| {
            assert_eq!(run.database_path(), dir.path().join("mine.db"));
            Ok(quiet_config())
        },
        move |_: &AppConfig| Ok(FakeDriver::new(stream)),
        LaunchHooks::default(),
    )
    .await
    .expect("run completes");

    assert_eq!(summary.workouts_created, 1);
    assert_eq!(summary.sets_created, 2);

    let db = Database::open(&dir.path().join("mine.db")).unwrap();
    assert_eq!(db.table_counts().unwrap().sets, 2);
}

#[tokio::test]
async fn test_sync_failure_reports_partial_summary() {
    let dir = tempfile::tempdir().unwrap();
    let stream = vec![page(&[
        item("2024-01-02", &[group("Squat", &["5 reps"])]),
        item("2024-01-01", &[group("Squat", &["5 reps"])]),
    ])];

    let result = launch(
        args(Some("lifter"), Some("secret"), dir.path()),
        |_: &RunConfig| {
            let mut config = quiet_config();
            config.network.max_attempts = 1;
            Ok(config)
        },
        move |_: &AppConfig| Ok(FakeDriver::new(stream).failing_page(1, DriverError::Timeout)),
        LaunchHooks::default(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, LaunchError::Sync(_)));
    let summary = err.summary().expect("partial summary");
    assert_eq!(summary.pages_scraped, 1);
    assert_eq!(summary.workouts_created, 1);
}
