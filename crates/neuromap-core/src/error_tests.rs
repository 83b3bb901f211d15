//! Error module tests

use crate::error::{Error, Result};

#[test]
fn test_validation_error() {
    let error = Error::validation("At least two context names are required for merging");
    assert_eq!(error.code(), "E100");
    assert_eq!(error.suggestion(), None);
    assert!(!error.is_retryable());
    assert!(error.to_string().contains("At least two context names"));
}

#[test]
fn test_not_found_error() {
    let error = Error::not_found("Mind map not found for context 'research'");
    assert_eq!(error.code(), "E200");
    assert!(error.suggestion().unwrap().starts_with("neuromap generate"));
    assert!(!error.is_retryable());
    assert!(error.to_string().contains("research"));
}

#[test]
fn test_upstream_error_is_retryable() {
    let error = Error::upstream("Knowledge expansion failed for context 'c': boom");
    assert_eq!(error.code(), "E300");
    assert!(error.is_retryable());
    assert!(error.to_string().contains("boom"));
}

#[test]
fn test_timeout_error() {
    let error = Error::Timeout {
        operation: "knowledge expansion".to_string(),
        timeout_ms: 5000,
    };
    assert_eq!(error.code(), "E301");
    assert!(error.is_retryable());
    assert_eq!(
        error.suggestion(),
        Some("neuromap config set expansion.timeout_secs 10".to_string())
    );
    assert!(error.to_string().contains("5000ms"));
}

#[test]
fn test_computation_error() {
    let error = Error::computation("raw graph contains duplicate node id 'a'");
    assert_eq!(error.code(), "E400");
    assert!(!error.is_retryable());
}

#[test]
fn test_lock_timeout_error() {
    let error = Error::LockTimeout("user123/ctx".to_string());
    assert_eq!(error.code(), "E500");
    assert!(error.is_retryable());
    assert!(error.to_string().contains("user123/ctx"));
}

#[test]
fn test_cancelled_error() {
    let error = Error::Cancelled("generation for context 'ctx'".to_string());
    assert_eq!(error.code(), "E501");
    assert!(!error.is_retryable());
}

#[test]
fn test_config_error() {
    let error = Error::ConfigError("bad value".to_string());
    assert_eq!(error.code(), "E600");
    assert_eq!(error.suggestion(), Some("neuromap config list".to_string()));
}

#[test]
fn test_io_error_conversion() {
    fn read() -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
        Ok(())
    }
    let error = read().unwrap_err();
    assert_eq!(error.code(), "E9999");
}
