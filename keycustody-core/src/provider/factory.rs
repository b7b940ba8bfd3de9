use std::sync::Arc;

use super::{CryptoProvider, ProviderKind};
use crate::{CustodyError, CustodyResult, KeyType};

/// Picks the provider for a key type from an ordered list.
///
/// The first provider whose [`supports`](CryptoProvider::supports) returns
/// `true` wins. Selection has no side effects, so the same key type resolves
/// to the same provider as long as the providers' answers do not change.
#[derive(Clone)]
pub struct CryptoProviderFactory {
    providers: Vec<Arc<dyn CryptoProvider>>,
}

impl CryptoProviderFactory {
    /// Creates a factory over `providers`, in priority order.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn CryptoProvider>>) -> Self {
        Self { providers }
    }

    /// Returns the first provider that supports `key_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::NoProviderForKeyType`] if no provider does.
    pub async fn for_key_type(&self, key_type: KeyType) -> CustodyResult<Arc<dyn CryptoProvider>> {
        for provider in &self.providers {
            if provider.supports(key_type).await {
                log::debug!("{key_type} keys served by the {} provider", provider.kind());
                return Ok(Arc::clone(provider));
            }
        }
        Err(CustodyError::NoProviderForKeyType { key_type })
    }

    /// Returns the configured provider of the given kind.
    #[must_use]
    pub fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn CryptoProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.kind() == kind)
            .cloned()
    }

    /// All configured providers, in priority order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn CryptoProvider>] {
        &self.providers
    }
}
