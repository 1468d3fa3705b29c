//! Custom error types for Courier
//!
//! Provides structured error handling with context propagation
//! and user-friendly error messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Courier operations
#[derive(Error, Debug)]
pub enum CourierError {
    /// Configuration related errors, including client certificate material
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError { path: String, source: std::io::Error },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Unsupported client certificate type: {0}")]
    UnsupportedCertificateType(String),

    #[error("Failed to read certificate material from {path}: {reason}")]
    CertificateRead { path: String, reason: String },

    #[error("Failed to decrypt certificate material in {path}: wrong or missing passphrase")]
    CertificateDecrypt { path: String },

    #[error("Invalid client identity in {path}: {reason}")]
    InvalidIdentity { path: String, reason: String },

    #[error("No private key and certificate pair found in {path}")]
    NoIdentity { path: String },
}

/// HTTP client errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("TLS error for {host}: {reason}")]
    Tls { host: String, reason: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Failure raised by a terminal assertion check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssertionError {
    #[error("expected {actual} to {check} {expected}")]
    Mismatch {
        check: String,
        expected: serde_json::Value,
        actual: serde_json::Value,
    },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl AssertionError {
    pub(crate) fn mismatch(
        check: &str,
        expected: impl Into<serde_json::Value>,
        actual: impl Into<serde_json::Value>,
    ) -> Self {
        AssertionError::Mismatch {
            check: check.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Name of the check that failed
    pub fn check(&self) -> &str {
        match self {
            AssertionError::Mismatch { check, .. } => check,
            AssertionError::InvalidPattern { .. } => "match",
        }
    }
}

/// Secret string (passphrases). Never printed.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl CourierError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CourierError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            CourierError::Http(e) => format!("Network issue: {}", e.user_hint()),
            CourierError::Io(e) => format!("File system issue: {}", e),
        }
    }

    /// True for errors raised before any network activity
    pub fn is_config(&self) -> bool {
        matches!(self, CourierError::Config(_))
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors.".into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
            ConfigError::UnsupportedCertificateType(kind) => {
                format!("Certificate type '{}' is not supported. Use 'pfx' or 'pem'.", kind)
            }
            ConfigError::CertificateRead { path, .. } => {
                format!("Could not read certificate file '{}'.", path)
            }
            ConfigError::CertificateDecrypt { path } => {
                format!("The passphrase for '{}' is wrong or missing.", path)
            }
            ConfigError::InvalidIdentity { path, reason } => {
                format!("'{}' does not hold a usable client identity: {}", path, reason)
            }
            ConfigError::NoIdentity { path } => {
                format!("'{}' contains no certificate with a matching private key.", path)
            }
        }
    }
}

impl UserHint for HttpError {
    fn user_hint(&self) -> String {
        match self {
            HttpError::Connection { host, .. } => {
                format!("Could not connect to {}. Check if it's running and accessible.", host)
            }
            HttpError::Timeout(ms) => {
                format!("Request timed out after {}ms. The server may be slow or unresponsive.", ms)
            }
            HttpError::InvalidUrl(url) => {
                format!("'{}' is not a valid URL. Check the format.", url)
            }
            HttpError::Tls { host, .. } => {
                format!("TLS handshake with {} failed. The certificate may be invalid or expired.", host)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for AssertionError {
    fn user_hint(&self) -> String {
        match self {
            AssertionError::Mismatch { check, expected, actual } => {
                format!("Check '{}' failed: expected {}, got {}", check, expected, actual)
            }
            AssertionError::InvalidPattern { pattern, .. } => {
                format!("'{}' is not a valid regular expression.", pattern)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_decrypt_error_has_no_passphrase() {
        let err = ConfigError::CertificateDecrypt {
            path: "/certs/client.pfx".to_string(),
        };
        let message = CourierError::from(err).user_message();
        assert!(message.contains("/certs/client.pfx"));
        assert!(!message.contains("hunter2"));
    }

    #[test]
    fn test_assertion_mismatch_fields() {
        let err = AssertionError::mismatch("below", 1000, 1000);
        assert_eq!(err.check(), "below");
        match err {
            AssertionError::Mismatch { expected, actual, .. } => {
                assert_eq!(expected, serde_json::json!(1000));
                assert_eq!(actual, serde_json::json!(1000));
            }
            _ => panic!("expected mismatch"),
        }
    }
}
