//! Client identity material for mutual TLS
//!
//! Loads PFX/PKCS#12 and PEM client certificates, selects the identity
//! to present per host, and caches resolved material per (host, config).

mod identity;
mod provider;
mod resolver;
mod trust;

pub use identity::{ClientIdentity, IdentityEntry};
pub use provider::TlsMaterialProvider;
pub use resolver::HostAwareResolver;
pub use trust::{client_config, InsecureVerifier};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ConfigError, Secret};

/// Client certificate container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateKind {
    /// PKCS#12 store holding certificate chain and key
    Pfx,
    /// Separate PEM certificate and key files
    Pem,
}

impl FromStr for CertificateKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pfx" | "p12" | "pkcs12" => Ok(CertificateKind::Pfx),
            "pem" => Ok(CertificateKind::Pem),
            other => Err(ConfigError::UnsupportedCertificateType(other.to_string())),
        }
    }
}

/// Host-scoped client certificate configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientCertificateConfig {
    /// Host this certificate is presented to (`api.example.com`, `*.example.com` or `*`)
    pub host: String,

    /// Container format
    #[serde(rename = "type")]
    pub kind: CertificateKind,

    /// PFX store, or PEM certificate chain
    pub cert_path: PathBuf,

    /// PEM private key (PEM only)
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Store or key passphrase
    #[serde(default)]
    pub passphrase: Option<Secret>,
}

impl ClientCertificateConfig {
    pub fn pfx(host: &str, path: impl Into<PathBuf>, passphrase: Option<Secret>) -> Self {
        Self {
            host: host.to_string(),
            kind: CertificateKind::Pfx,
            cert_path: path.into(),
            key_path: None,
            passphrase,
        }
    }

    pub fn pem(
        host: &str,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        passphrase: Option<Secret>,
    ) -> Self {
        Self {
            host: host.to_string(),
            kind: CertificateKind::Pem,
            cert_path: cert_path.into(),
            key_path: Some(key_path.into()),
            passphrase,
        }
    }

    /// Check whether this certificate applies to a host
    pub fn matches_host(&self, host: &str) -> bool {
        host_matches(&self.host, host)
    }
}

/// Match a host against a pattern: exact, `*.suffix` or `*`
pub(crate) fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }

    match pattern.strip_prefix("*.") {
        Some(suffix) => {
            host.len() > suffix.len() + 1
                && host[host.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
                && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
        }
        None => pattern.eq_ignore_ascii_case(host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("PFX".parse::<CertificateKind>().unwrap(), CertificateKind::Pfx);
        assert_eq!("p12".parse::<CertificateKind>().unwrap(), CertificateKind::Pfx);
        assert_eq!("pem".parse::<CertificateKind>().unwrap(), CertificateKind::Pem);
        assert!(matches!(
            "jks".parse::<CertificateKind>(),
            Err(ConfigError::UnsupportedCertificateType(kind)) if kind == "jks"
        ));
    }

    #[test]
    fn test_host_matching() {
        assert!(host_matches("api.example.com", "API.example.com"));
        assert!(host_matches("*.example.com", "api.example.com"));
        assert!(host_matches("*.example.com", "a.b.example.com"));
        assert!(!host_matches("*.example.com", "example.com"));
        assert!(!host_matches("*.example.com", "badexample.com"));
        assert!(host_matches("*", "anything.test"));
    }

    #[test]
    fn test_config_debug_hides_passphrase() {
        let config = ClientCertificateConfig::pfx("h", "/c.pfx", Some("s3cr3t".into()));
        assert!(!format!("{:?}", config).contains("s3cr3t"));
    }
}
