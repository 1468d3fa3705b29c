//! Engine configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::tls::{CertificateKind, ClientCertificateConfig};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP execution settings
    pub http: HttpSettings,

    /// TLS settings
    pub tls: TlsSettings,

    /// Streaming session settings
    pub streaming: StreamingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-call timeout in seconds (connect, read and write of one hop)
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Bodies larger than this are streamed to a temporary file
    pub max_body_size: usize,

    /// Follow redirects by default
    pub follow_redirects: bool,

    /// Maximum redirect depth
    pub max_redirects: usize,

    /// Upstream proxy URL
    pub proxy: Option<String>,

    /// User agent string
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Verify server certificates. Disabling selects the explicit insecure trust path.
    pub verify_certificates: bool,

    /// Host-scoped client certificates for mutual TLS
    pub client_certificates: Vec<ClientCertificateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Maximum number of sessions kept in the session log
    pub max_sessions: usize,

    /// Maximum number of events kept in the session log
    pub max_events: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_body_size: 5 * 1024 * 1024, // 5MB
            follow_redirects: true,
            max_redirects: 10,
            proxy: None,
            user_agent: format!("Courier/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            verify_certificates: true,
            client_certificates: Vec::new(),
        }
    }
}

impl TlsSettings {
    /// Find the client certificate configured for a host
    pub fn certificate_for(&self, host: &str) -> Option<&ClientCertificateConfig> {
        self.client_certificates.iter().find(|c| c.matches_host(host))
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_events: 10000,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::ReadError {
                    path: config_path.display().to_string(),
                    source,
                }
            })?;

            let config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;

            tracing::info!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)?;

        tracing::info!("Saved configuration to {:?}", config_path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs", "must be greater than 0"));
        }

        if self.http.connect_timeout_secs == 0 {
            return Err(invalid("http.connect_timeout_secs", "must be greater than 0"));
        }

        if let Some(proxy) = &self.http.proxy {
            if url::Url::parse(proxy).is_err() {
                return Err(invalid("http.proxy", "must be an absolute URL"));
            }
        }

        for (i, cert) in self.tls.client_certificates.iter().enumerate() {
            if cert.host.trim().is_empty() {
                return Err(invalid(&format!("tls.client_certificates[{}].host", i), "is empty"));
            }
            if cert.cert_path.as_os_str().is_empty() {
                return Err(invalid(
                    &format!("tls.client_certificates[{}].cert_path", i),
                    "is empty",
                ));
            }
            if cert.kind == CertificateKind::Pem && cert.key_path.is_none() {
                return Err(invalid(
                    &format!("tls.client_certificates[{}].key_path", i),
                    "is required for PEM certificates",
                ));
            }
        }

        Ok(())
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "courier", "courier")
            .context("Failed to determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "courier", "courier")
            .context("Failed to determine data directory")?;

        Ok(dirs.data_dir().to_path_buf())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.tls.verify_certificates);
        assert_eq!(config.http.max_redirects, 10);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.http.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_pem_requires_key_path() {
        let mut config = Config::default();
        config.tls.client_certificates.push(ClientCertificateConfig {
            host: "api.example.com".to_string(),
            kind: CertificateKind::Pem,
            cert_path: PathBuf::from("/certs/client.crt"),
            key_path: None,
            passphrase: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let mut config = Config::default();
        config.http.max_redirects = 3;
        config.tls.client_certificates.push(ClientCertificateConfig {
            host: "*.example.com".to_string(),
            kind: CertificateKind::Pfx,
            cert_path: PathBuf::from("/certs/client.pfx"),
            key_path: None,
            passphrase: Some("changeit".into()),
        });
        config.save(Some(path_str)).unwrap();

        let loaded = Config::load(Some(path_str)).unwrap();
        assert_eq!(loaded.http.max_redirects, 3);
        assert_eq!(loaded.tls, config.tls);
        assert!(loaded.tls.certificate_for("api.example.com").is_some());
        assert!(loaded.tls.certificate_for("example.org").is_none());
    }
}
