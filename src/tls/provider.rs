//! Cache of resolved client identity material

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::identity::ClientIdentity;
use super::ClientCertificateConfig;
use crate::app::TlsSettings;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    host: String,
    config: ClientCertificateConfig,
}

#[derive(Debug)]
struct CacheState {
    verify_certificates: bool,
    generation: u64,
    entries: HashMap<CacheKey, Arc<ClientIdentity>>,
}

/// Resolves and caches client identity material per (host, config).
///
/// Resolution is idempotent. Invalidation happens under a single write
/// lock, so readers see either the old entry or none.
#[derive(Debug)]
pub struct TlsMaterialProvider {
    state: RwLock<CacheState>,
}

impl TlsMaterialProvider {
    pub fn new(settings: &TlsSettings) -> Self {
        Self {
            state: RwLock::new(CacheState {
                verify_certificates: settings.verify_certificates,
                generation: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Current server certificate verification policy
    pub fn verify_certificates(&self) -> bool {
        self.state.read().verify_certificates
    }

    /// Get identity material for a host, loading it on first use
    pub fn resolve(
        &self,
        host: &str,
        config: &ClientCertificateConfig,
    ) -> Result<Arc<ClientIdentity>, ConfigError> {
        let key = CacheKey {
            host: host.to_ascii_lowercase(),
            config: config.clone(),
        };

        let generation = {
            let state = self.state.read();
            if let Some(identity) = state.entries.get(&key) {
                return Ok(identity.clone());
            }
            state.generation
        };

        // Load outside the lock; concurrent callers may race, the first insert wins.
        let identity = Arc::new(ClientIdentity::load(config)?);

        let mut state = self.state.write();
        if state.generation != generation {
            // Invalidated while loading; hand out the fresh material without caching it.
            return Ok(identity);
        }

        Ok(state.entries.entry(key).or_insert(identity).clone())
    }

    /// Drop every cached entry resolved from this config
    pub fn invalidate(&self, config: &ClientCertificateConfig) {
        let mut state = self.state.write();
        state.entries.retain(|key, _| &key.config != config);
        state.generation += 1;
    }

    /// Drop everything
    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.generation += 1;
    }

    /// Apply changed TLS settings.
    ///
    /// A changed verification policy clears the cache; otherwise entries
    /// whose config no longer exists are dropped.
    pub fn apply(&self, settings: &TlsSettings) {
        let mut state = self.state.write();

        if state.verify_certificates != settings.verify_certificates {
            tracing::info!(
                verify = settings.verify_certificates,
                "TLS verification policy changed, clearing identity cache"
            );
            state.verify_certificates = settings.verify_certificates;
            state.entries.clear();
        } else {
            state
                .entries
                .retain(|key, _| settings.client_certificates.contains(&key.config));
        }

        state.generation += 1;
    }

    /// Number of cached entries
    pub fn cached(&self) -> usize {
        self.state.read().entries.len()
    }
}
