//! Integration test modules.

mod fake_driver;
mod fetcher_test;
mod launch_test;
mod session_test;
