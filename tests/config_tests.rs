//! Tests for loading client configuration.

use std::io::Write;

use httptrail::config::{ClientConfig, TlsConfig};
use httptrail::error::HttpTrailError;
use pretty_assertions::assert_eq;

#[test]
fn loads_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        request_timeout_secs = 30
        user_agent = "httptrail-tests"
        block_hostnames = ["*.internal"]
        "#
    )
    .unwrap();

    let config = ClientConfig::from_file(file.path()).unwrap();
    assert_eq!(config.request_timeout_secs, Some(30));
    assert_eq!(config.user_agent.as_deref(), Some("httptrail-tests"));
    assert_eq!(config.block_hostnames, vec!["*.internal".to_string()]);
    assert_eq!(config.tls, TlsConfig::default());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ClientConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, HttpTrailError::Io(_)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = ClientConfig::from_toml_str("dial_timeout_secs = \"soon\"").unwrap_err();
    assert!(matches!(err, HttpTrailError::Toml(_)));
}

#[test]
fn code_settings_override_loaded_ones() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "dial_timeout_secs = 9\nmax_conns_per_host = 4").unwrap();

    let loaded = ClientConfig::load(Some(file.path())).unwrap();
    let config = loaded.merge(ClientConfig::builder().dial_timeout_secs(1).build());
    assert_eq!(config.dial_timeout_secs, Some(1));
    assert_eq!(config.max_conns_per_host(), 4);
}
