//! Layered configuration loading: defaults, TOML file, environment.

use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;
use vil_dashboard::{DashboardConfig, DashboardError};

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn missing_file_yields_defaults() {
    let config = DashboardConfig::load_from("/nonexistent/dashboard.toml").unwrap();
    assert_eq!(config, DashboardConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn file_overrides_defaults_partially() {
    let file = toml_file(
        r#"
        [server]
        base_url = "http://10.0.0.5:9000"

        [notifications]
        poll_interval_ms = 2000
        "#,
    );
    let config = DashboardConfig::load_from(file.path()).unwrap();
    assert_eq!(config.server.base_url.as_deref(), Some("http://10.0.0.5:9000"));
    assert_eq!(config.notifications.poll_interval_ms, 2000);
    assert_eq!(config.notifications.page_size, 20);
    assert_eq!(config.reconnect.max_delay_ms, 30_000);
}

#[test]
#[serial]
fn environment_overrides_file() {
    let file = toml_file(
        r#"
        [logs]
        max_entries = 50
        "#,
    );
    std::env::set_var("VIL_DASHBOARD_LOGS__MAX_ENTRIES", "75");
    std::env::set_var("VIL_DASHBOARD_APPLICATION__LOG_LEVEL", "debug");
    let config = DashboardConfig::load_from(file.path());
    std::env::remove_var("VIL_DASHBOARD_LOGS__MAX_ENTRIES");
    std::env::remove_var("VIL_DASHBOARD_APPLICATION__LOG_LEVEL");

    let config = config.unwrap();
    assert_eq!(config.logs.max_entries, 75);
    assert_eq!(config.application.log_level, "debug");
}

#[test]
#[serial]
fn malformed_file_is_a_config_error() {
    let file = toml_file(
        r#"
        [reconnect]
        base_delay_ms = "soon"
        "#,
    );
    let err = DashboardConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, DashboardError::Config(_)), "{err}");
}

#[test]
#[serial]
fn semantic_errors_caught_by_validate() {
    let file = toml_file(
        r#"
        [reconnect]
        base_delay_ms = 5000
        max_delay_ms = 1000
        "#,
    );
    let config = DashboardConfig::load_from(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(DashboardError::Configuration(_))
    ));
}

#[test]
#[serial]
fn bundled_config_file_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dashboard.toml");
    let config = DashboardConfig::load_from(path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config, DashboardConfig::default());
}
