//! Session lifetime against the scripted driver.

use std::sync::Arc;

use fitocracy_sync::session::{AuthError, Credentials, SessionManager};
use fitocracy_sync::storage::config::RemoteSettings;

use crate::fake_driver::{FakeDriver, PROFILE_ID};

fn manager(driver: &Arc<FakeDriver>) -> SessionManager<FakeDriver> {
    SessionManager::new(Arc::clone(driver), RemoteSettings::default().home_url())
}

#[tokio::test]
async fn test_close_quits_driver_once() {
    let driver = Arc::new(FakeDriver::new(Vec::new()));

    let session = manager(&driver)
        .authenticate(&Credentials::new("lifter", "secret"))
        .await
        .unwrap();
    assert_eq!(session.profile_id().as_str(), PROFILE_ID);
    assert!(!driver.is_closed());

    session.close().await.unwrap();
    assert!(driver.is_closed());
    assert_eq!(driver.calls.quit.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_session_still_quits_driver() {
    let driver = Arc::new(FakeDriver::new(Vec::new()));

    let session = manager(&driver)
        .authenticate(&Credentials::new("lifter", "secret"))
        .await
        .unwrap();
    drop(session);

    // The quit runs on a spawned task.
    for _ in 0..10 {
        if driver.is_closed() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(driver.is_closed());
}

#[tokio::test]
async fn test_failed_login_quits_without_handle() {
    let driver = Arc::new(FakeDriver::new(Vec::new()).rejecting_login());

    let result = manager(&driver)
        .authenticate(&Credentials::new("lifter", "secret"))
        .await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    assert!(driver.is_closed());
}
