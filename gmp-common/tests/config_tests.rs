//! Unit tests for configuration loading and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate GMP_CONFIG are marked with #[serial].

use gmp_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_defaults() {
    let config = TomlConfig::default();

    assert_eq!(config.port, 5760);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.playback.max_resolve_attempts, 3);
    assert_eq!(config.playback.retry_base_delay_ms, 1000);
    assert_eq!(config.ytdlp.binary, "yt-dlp");
    assert_eq!(config.ytdlp.search_results_per_page, 10);
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_fields() {
    let config = TomlConfig::from_toml_str(
        r#"
        port = 8080

        [playback]
        max_resolve_attempts = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.playback.max_resolve_attempts, 5);
    // Untouched fields keep their defaults
    assert_eq!(config.playback.retry_base_delay_ms, 1000);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_values_are_rejected() {
    let result = TomlConfig::from_toml_str(
        r#"
        [playback]
        max_resolve_attempts = 0
        "#,
    );
    assert!(result.is_err());

    let result = TomlConfig::from_toml_str("port = \"not a number\"");
    assert!(result.is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[logging]\nlevel = \"debug\"\n\n[ytdlp]\nbinary = \"/opt/yt-dlp\"").unwrap();

    let config = TomlConfig::load(file.path()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.ytdlp.binary, "/opt/yt-dlp");
}

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/gmp-from-env.toml");

    let cli = PathBuf::from("/tmp/gmp-from-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));
    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/gmp-from-env.toml"))
    );

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_config_file_does_not_error() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/gmp-definitely-missing-config.toml");

    let config = TomlConfig::load_or_default(None).unwrap();
    assert_eq!(config, TomlConfig::default());

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_file_with_bad_content_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = [1, 2]").unwrap();

    let result = TomlConfig::load_or_default(Some(file.path()));
    assert!(result.is_err());
}
