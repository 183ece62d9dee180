//! Configuration loading tests.
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io::Write;
use std::time::Duration;

use logset_operator::config::{Config, ConfigError};
use logset_reconciler::IdRange;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn given_no_file_when_loading_then_defaults() {
    // GIVEN: A path that does not exist
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing.toml");

    // WHEN: Loading
    let config = Config::load(Some(&path)).expect("load should succeed");

    // THEN: Every default applies
    assert_eq!(config, Config::default());
    assert_eq!(config.reconciler.id_range, IdRange::DEFAULT);
}

#[test]
fn given_full_file_when_loading_then_every_field_read() {
    // GIVEN: A file setting every section
    let file = write_config(
        r#"
        namespace = "storage"
        concurrency = 8
        error-backoff-secs = 30

        [reconciler]
        store-failure-timeout = 120
        resync-interval = 60
        action-requeue = 2

        [reconciler.id-range]
        start = 1000
        end = 2000

        [log]
        filter = "logset=debug"
        json = true
        "#,
    );

    // WHEN: Loading
    let config = Config::load(Some(file.path())).expect("load should succeed");

    // THEN: Values come from the file
    assert_eq!(config.namespace.as_deref(), Some("storage"));
    assert_eq!(config.concurrency, 8);
    assert_eq!(config.error_backoff(), Duration::from_secs(30));
    assert_eq!(config.reconciler.store_failure_timeout, Duration::from_secs(120));
    assert_eq!(config.reconciler.resync_interval, Duration::from_secs(60));
    assert_eq!(config.reconciler.action_requeue, Duration::from_secs(2));
    assert_eq!(config.reconciler.id_range, IdRange::new(1000, 2000).expect("range"));
    assert!(config.log.json);
    assert_eq!(config.log.filter, "logset=debug");
}

#[test]
fn given_malformed_file_when_loading_then_parse_error_names_path() {
    // GIVEN: A file that is not TOML
    let file = write_config("concurrency = [");

    // WHEN: Loading
    let err = Config::load(Some(file.path())).expect_err("load should fail");

    // THEN: A parse error pointing at the file
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn given_inverted_id_range_when_loading_then_invalid() {
    // GIVEN: An identifier range whose end precedes its start
    let file = write_config(
        r#"
        [reconciler.id-range]
        start = 10
        end = 5
        "#,
    );

    // WHEN: Loading
    let result = Config::load(Some(file.path()));

    // THEN: Validation rejects it
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}
