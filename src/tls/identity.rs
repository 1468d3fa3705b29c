//! Loading client identities from PFX/PKCS#12 and PEM files

use rustls::sign::CertifiedKey;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{CertificateKind, ClientCertificateConfig};
use crate::error::{ConfigError, Secret};

const ENCRYPTED_PKCS8_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// One selectable identity (alias) inside a store
#[derive(Clone)]
pub struct IdentityEntry {
    alias: String,
    certified: Arc<CertifiedKey>,
    issuer: Vec<u8>,
    subject: String,
}

impl IdentityEntry {
    /// Build an entry from a certificate chain (leaf first) and its private key
    pub fn new(
        alias: &str,
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        source: &Path,
    ) -> Result<Self, ConfigError> {
        let leaf = chain.first().ok_or_else(|| ConfigError::NoIdentity {
            path: source.display().to_string(),
        })?;

        let (issuer, subject) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map(|(_, cert)| (cert.issuer().as_raw().to_vec(), cert.subject().to_string()))
            .map_err(|e| ConfigError::InvalidIdentity {
                path: source.display().to_string(),
                reason: format!("unparseable certificate: {}", e),
            })?;

        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key).map_err(|e| {
            ConfigError::InvalidIdentity {
                path: source.display().to_string(),
                reason: format!("unsupported private key: {}", e),
            }
        })?;

        Ok(Self {
            alias: alias.to_string(),
            certified: Arc::new(CertifiedKey::new(chain, signing_key)),
            issuer,
            subject,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// DER-encoded issuer name of the leaf certificate
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer
    }

    pub fn certified_key(&self) -> &Arc<CertifiedKey> {
        &self.certified
    }

    /// Whether the issuer matches a CA name hinted by the server
    pub(crate) fn issued_by(&self, hint: &[u8]) -> bool {
        // Hints may arrive with or without the outer SEQUENCE header
        self.issuer == hint || (!hint.is_empty() && self.issuer.ends_with(hint))
    }
}

impl fmt::Debug for IdentityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityEntry")
            .field("alias", &self.alias)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Resolved client identity material
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    source: PathBuf,
    entries: Vec<IdentityEntry>,
}

impl ClientIdentity {
    /// Load identity material described by a client certificate config.
    ///
    /// Fails without returning any partial material.
    pub fn load(config: &ClientCertificateConfig) -> Result<Self, ConfigError> {
        let passphrase = config.passphrase.as_ref();

        let identity = match config.kind {
            CertificateKind::Pfx => Self::from_pfx(&config.cert_path, passphrase)?,
            CertificateKind::Pem => {
                let key_path =
                    config
                        .key_path
                        .as_deref()
                        .ok_or_else(|| ConfigError::ValidationError {
                            field: "key_path".to_string(),
                            reason: "is required for PEM certificates".to_string(),
                        })?;
                Self::from_pem(&config.cert_path, key_path, passphrase)?
            }
        };

        tracing::info!(
            source = %identity.source.display(),
            aliases = identity.entries.len(),
            "Loaded client identity"
        );

        Ok(identity)
    }

    /// Open a PKCS#12 store. A missing passphrase is treated as empty.
    pub fn from_pfx(path: &Path, passphrase: Option<&Secret>) -> Result<Self, ConfigError> {
        let data = read_file(path)?;
        let password = passphrase.map(Secret::expose).unwrap_or("");

        let keystore = p12_keystore::KeyStore::from_pkcs12(&data, password).map_err(|e| {
            let reason = e.to_string();
            let lower = reason.to_ascii_lowercase();
            if lower.contains("mac") || lower.contains("password") || lower.contains("decrypt") {
                ConfigError::CertificateDecrypt {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::InvalidIdentity {
                    path: path.display().to_string(),
                    reason,
                }
            }
        })?;

        let mut entries = Vec::new();
        for (alias, entry) in keystore.entries() {
            if let p12_keystore::KeyStoreEntry::PrivateKeyChain(chain) = entry {
                let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(chain.key().to_vec()));
                let certs = chain
                    .chain()
                    .iter()
                    .map(|cert| CertificateDer::from(cert.as_der().to_vec()))
                    .collect();
                entries.push(IdentityEntry::new(alias, certs, key, path)?);
            }
        }

        Self::from_entries(path, entries)
    }

    /// Pair a PEM certificate chain with a PEM private key.
    ///
    /// With a passphrase the key must be an encrypted PKCS#8 key;
    /// without one it is loaded unencrypted.
    pub fn from_pem(
        cert_path: &Path,
        key_path: &Path,
        passphrase: Option<&Secret>,
    ) -> Result<Self, ConfigError> {
        let cert_data = read_file(cert_path)?;
        let certs = CertificateDer::pem_slice_iter(&cert_data)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::InvalidIdentity {
                path: cert_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if certs.is_empty() {
            return Err(ConfigError::NoIdentity {
                path: cert_path.display().to_string(),
            });
        }

        let key_data = read_file(key_path)?;
        let key = match passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => decrypt_pem_key(key_path, &key_data, passphrase)?,
            None => plain_pem_key(key_path, &key_data)?,
        };

        let alias = cert_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("client");
        let entry = IdentityEntry::new(alias, certs, key, cert_path)?;

        Self::from_entries(cert_path, vec![entry])
    }

    pub(crate) fn from_entries(
        source: &Path,
        entries: Vec<IdentityEntry>,
    ) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoIdentity {
                path: source.display().to_string(),
            });
        }

        Ok(Self {
            source: source.to_path_buf(),
            entries,
        })
    }

    pub fn entries(&self) -> &[IdentityEntry] {
        &self.entries
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(IdentityEntry::alias)
    }

    pub fn entry(&self, alias: &str) -> Option<&IdentityEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    pub fn has_certs(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|e| ConfigError::CertificateRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn plain_pem_key(path: &Path, data: &[u8]) -> Result<PrivateKeyDer<'static>, ConfigError> {
    PrivateKeyDer::from_pem_slice(data).map_err(|e| {
        let text = String::from_utf8_lossy(data);
        if text.contains(ENCRYPTED_PKCS8_LABEL) || text.contains("Proc-Type: 4,ENCRYPTED") {
            ConfigError::CertificateDecrypt {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::InvalidIdentity {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        }
    })
}

fn decrypt_pem_key(
    path: &Path,
    data: &[u8],
    passphrase: &Secret,
) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidIdentity {
        path: path.display().to_string(),
        reason,
    };

    let text = std::str::from_utf8(data).map_err(|_| invalid("key file is not PEM text".into()))?;

    if text.contains("Proc-Type: 4,ENCRYPTED") {
        return Err(invalid(
            "legacy encrypted PEM keys are not supported, convert the key to encrypted PKCS#8".into(),
        ));
    }

    if !text.contains(ENCRYPTED_PKCS8_LABEL) {
        // Passphrase given for an unencrypted key; nothing to decrypt.
        return plain_pem_key(path, data);
    }

    let (label, document) =
        pkcs8::Document::from_pem(text).map_err(|e| invalid(format!("malformed PEM: {}", e)))?;
    if label != ENCRYPTED_PKCS8_LABEL {
        return Err(invalid(format!("unexpected PEM section '{}'", label)));
    }

    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes())
        .map_err(|e| invalid(format!("malformed encrypted key: {}", e)))?;

    let decrypted = encrypted
        .decrypt(passphrase.expose())
        .map_err(|_| ConfigError::CertificateDecrypt {
            path: path.display().to_string(),
        })?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}
