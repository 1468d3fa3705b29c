//! Host-aware client certificate selection

use rustls::client::ResolvesClientCert;
use rustls::sign::CertifiedKey;
use rustls::SignatureScheme;
use std::sync::Arc;

use super::host_matches;
use super::identity::{ClientIdentity, IdentityEntry};

/// Client certificate resolver bound to one target host.
///
/// Only alias selection is decided here; certificate availability and
/// signing are delegated to the underlying identity material unchanged.
#[derive(Debug)]
pub struct HostAwareResolver {
    host: String,
    identity: Arc<ClientIdentity>,
}

impl HostAwareResolver {
    pub fn new(host: &str, identity: Arc<ClientIdentity>) -> Self {
        Self {
            host: host.to_string(),
            identity,
        }
    }

    /// Choose the alias to present to this host.
    ///
    /// Order: an alias naming the host, then a certificate issued by one of
    /// the CAs the server hinted, then the first usable alias.
    pub fn choose_alias(
        &self,
        root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<&IdentityEntry> {
        let usable: Vec<&IdentityEntry> = self
            .identity
            .entries()
            .iter()
            .filter(|e| sigschemes.is_empty() || e.certified_key().key.choose_scheme(sigschemes).is_some())
            .collect();

        usable
            .iter()
            .find(|e| host_matches(e.alias(), &self.host))
            .or_else(|| {
                usable.iter().find(|e| {
                    root_hint_subjects
                        .iter()
                        .any(|hint| e.issued_by(hint))
                })
            })
            .or_else(|| usable.first())
            .copied()
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl ResolvesClientCert for HostAwareResolver {
    fn resolve(
        &self,
        root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        let entry = self.choose_alias(root_hint_subjects, sigschemes);

        match entry {
            Some(entry) => {
                tracing::debug!(host = %self.host, alias = entry.alias(), "Presenting client certificate");
                Some(entry.certified_key().clone())
            }
            None => {
                tracing::warn!(host = %self.host, "No client certificate supports the offered signature schemes");
                None
            }
        }
    }

    fn has_certs(&self) -> bool {
        self.identity.has_certs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::identity::tests::entry_for;
    use std::path::Path;

    const SCHEMES: &[SignatureScheme] = &[
        SignatureScheme::ECDSA_NISTP256_SHA256,
        SignatureScheme::RSA_PSS_SHA256,
    ];

    fn identity(entries: Vec<IdentityEntry>) -> Arc<ClientIdentity> {
        Arc::new(ClientIdentity::from_entries(Path::new("memory"), entries).unwrap())
    }

    #[test]
    fn test_prefers_alias_named_after_host() {
        let identity = identity(vec![
            entry_for("default", "one.example"),
            entry_for("api.example.com", "two.example"),
        ]);
        let resolver = HostAwareResolver::new("api.example.com", identity);

        let chosen = resolver.choose_alias(&[], SCHEMES).unwrap();
        assert_eq!(chosen.alias(), "api.example.com");
    }

    #[test]
    fn test_falls_back_to_issuer_hint() {
        let first = entry_for("first", "one.example");
        let second = entry_for("second", "two.example");
        let hint = second.issuer_der().to_vec();
        assert!(!first.issued_by(&hint));

        let resolver = HostAwareResolver::new("api.example.com", identity(vec![first, second]));
        let chosen = resolver.choose_alias(&[hint.as_slice()], SCHEMES).unwrap();
        assert_eq!(chosen.alias(), "second");
    }

    #[test]
    fn test_falls_back_to_first_alias() {
        let resolver = HostAwareResolver::new(
            "api.example.com",
            identity(vec![entry_for("first", "a"), entry_for("second", "b")]),
        );
        assert_eq!(resolver.choose_alias(&[], SCHEMES).unwrap().alias(), "first");
    }

    #[test]
    fn test_no_alias_when_schemes_unsupported() {
        let resolver = HostAwareResolver::new("h", identity(vec![entry_for("only", "a")]));
        assert!(resolver
            .resolve(&[], &[SignatureScheme::ED448])
            .is_none());
        assert!(resolver.has_certs());
    }

    #[test]
    fn test_resolve_returns_selected_key() {
        let entry = entry_for("api.example.com", "a");
        let expected = entry.certified_key().clone();
        let resolver = HostAwareResolver::new(
            "api.example.com",
            identity(vec![entry_for("other", "b"), entry]),
        );

        let resolved = resolver.resolve(&[], SCHEMES).unwrap();
        assert!(Arc::ptr_eq(&resolved, &expected));
    }
}
