//! Server trust paths for outgoing TLS connections

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::{ring, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

use crate::error::HttpError;

/// Accept-all server verifier.
///
/// Only installed when certificate verification is explicitly disabled in
/// configuration. Building a config with it always logs a warning.
#[derive(Debug)]
pub struct InsecureVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl InsecureVerifier {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn root_store() -> RootCertStore {
    RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
}

/// Build a rustls client configuration.
///
/// `verify == false` selects the insecure trust path; `host` only labels
/// log output. `client_auth` presents a client certificate when set.
pub fn client_config(
    verify: bool,
    host: Option<&str>,
    client_auth: Option<Arc<dyn ResolvesClientCert>>,
) -> Result<ClientConfig, HttpError> {
    let provider = Arc::new(ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls {
            host: host.unwrap_or("*").to_string(),
            reason: e.to_string(),
        })?;

    let builder = if verify {
        builder.with_root_certificates(root_store())
    } else {
        tracing::warn!(
            host = host.unwrap_or("*"),
            "TLS certificate verification is DISABLED for this client"
        );
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier::new(&provider)))
    };

    let mut config = match client_auth {
        Some(resolver) => builder.with_client_cert_resolver(resolver),
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::identity::tests::entry_for;
    use crate::tls::{ClientIdentity, HostAwareResolver};
    use std::path::Path;

    #[test]
    fn test_verifying_config() {
        let config = client_config(true, Some("example.com"), None).unwrap();
        assert!(!config.client_auth_cert_resolver.has_certs());
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_insecure_config() {
        assert!(client_config(false, None, None).is_ok());
    }

    #[test]
    fn test_config_with_client_identity() {
        let identity = ClientIdentity::from_entries(
            Path::new("memory"),
            vec![entry_for("api.example.com", "client")],
        )
        .unwrap();
        let resolver = HostAwareResolver::new("api.example.com", Arc::new(identity));

        let config = client_config(true, Some("api.example.com"), Some(Arc::new(resolver))).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn test_insecure_verifier_schemes() {
        let verifier = InsecureVerifier::new(&ring::default_provider());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
