//! Integration test entry point
//!
//! Run with: HERMES_RUN_INTEGRATION_TESTS=1 cargo test --test integration


use std::env;

use hermes_mysql::Opts;

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("HERMES_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Get MySQL connection options from environment
pub fn test_opts() -> Opts {
    Opts {
        host: Some(env::var("HERMES_TEST_MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())),
        port: env::var("HERMES_TEST_MYSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        user: env::var("HERMES_TEST_MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("HERMES_TEST_MYSQL_PASS").unwrap_or_default(),
        database: Some(env::var("HERMES_TEST_MYSQL_DB").unwrap_or_else(|_| "test".to_string())),
        ..Opts::default()
    }
}
