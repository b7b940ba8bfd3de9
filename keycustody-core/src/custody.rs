use std::sync::Arc;

use crate::keystore::SecureKeystore;
use crate::provider::{
    CleanupReport, CryptoProvider, CryptoProviderFactory, LocalKeyProvider, ProviderKind,
    RemoteKeyProvider,
};
use crate::storage::{AttestationTable, CredentialsStore, KeyAttestationStore};
use crate::wallet_provider::{DeviceInfo, WalletProviderClient};
use crate::{CustodyError, CustodyResult, KeyAttestation, KeyType, WalletInstanceCredentials};

/// Root of the key custody graph.
///
/// Build one at start-up and share it. Each provider exists exactly once and
/// both share the same attestation store.
pub struct KeyCustody {
    store: KeyAttestationStore,
    credentials: Arc<dyn CredentialsStore>,
    client: Arc<dyn WalletProviderClient>,
    local: Arc<LocalKeyProvider>,
    remote: Arc<RemoteKeyProvider>,
    factory: CryptoProviderFactory,
}

impl KeyCustody {
    /// Wires the providers and the factory. The factory prefers the local
    /// provider over the remote one.
    #[must_use]
    pub fn new(
        keystore: Arc<dyn SecureKeystore>,
        table: Arc<dyn AttestationTable>,
        credentials: Arc<dyn CredentialsStore>,
        client: Arc<dyn WalletProviderClient>,
    ) -> Self {
        let store = KeyAttestationStore::new(table);
        let local = Arc::new(LocalKeyProvider::new(
            keystore,
            store.clone(),
            Arc::clone(&credentials),
            Arc::clone(&client),
        ));
        let remote = Arc::new(RemoteKeyProvider::new(
            store.clone(),
            Arc::clone(&credentials),
            Arc::clone(&client),
        ));
        let factory = CryptoProviderFactory::new(vec![
            Arc::clone(&local) as Arc<dyn CryptoProvider>,
            Arc::clone(&remote) as Arc<dyn CryptoProvider>,
        ]);

        Self {
            store,
            credentials,
            client,
            local,
            remote,
            factory,
        }
    }

    /// Registers this app instance with the wallet-provider.
    ///
    /// Registration happens once; later calls return the stored credentials
    /// without contacting the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service call or persisting the credentials fails.
    pub async fn register(&self, device_info: &DeviceInfo) -> CustodyResult<WalletInstanceCredentials> {
        if let Some(existing) = self.credentials.get()? {
            log::debug!("wallet instance {} already registered", existing.instance_id);
            return Ok(existing);
        }

        let credentials = self.client.register_instance(device_info).await?;
        self.credentials.set(&credentials)?;
        log::info!("registered wallet instance {}", credentials.instance_id);
        Ok(credentials)
    }

    /// Activates the registered instance with a token delivered out of band.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::NotRegistered`] before registration, or the
    /// service error.
    pub async fn activate(&self, token: &str) -> CustodyResult<()> {
        let credentials = self.credentials.get()?.ok_or(CustodyError::NotRegistered)?;
        self.client.activate_instance(token, &credentials).await
    }

    /// Whether credentials are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials store cannot be read.
    pub fn is_registered(&self) -> CustodyResult<bool> {
        Ok(self.credentials.get()?.is_some())
    }

    /// The provider selected for new keys of `key_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::NoProviderForKeyType`] if no provider supports it.
    pub async fn provider_for_key_type(
        &self,
        key_type: KeyType,
    ) -> CustodyResult<Arc<dyn CryptoProvider>> {
        self.factory.for_key_type(key_type).await
    }

    /// The provider holding the existing key `key_id`.
    ///
    /// Resolved from the provider recorded with the attestation, without
    /// asking the factory: a local RSA key stays local, and an unreachable
    /// wallet-provider does not hide a remote key.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::AttestationNotFound`] for unknown keys.
    pub fn provider_for_key(&self, key_id: &str) -> CustodyResult<Arc<dyn CryptoProvider>> {
        let attestation = self.store.get(key_id)?;
        Ok(self.provider(attestation.provider))
    }

    /// The provider of the given kind.
    #[must_use]
    pub fn provider(&self, kind: ProviderKind) -> Arc<dyn CryptoProvider> {
        match kind {
            ProviderKind::Local => Arc::clone(&self.local) as Arc<dyn CryptoProvider>,
            ProviderKind::Remote => Arc::clone(&self.remote) as Arc<dyn CryptoProvider>,
        }
    }

    /// Generates a key of `key_type` with the selected provider.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider supports the type or generation fails.
    pub async fn generate_key(&self, key_type: KeyType) -> CustodyResult<KeyAttestation> {
        self.provider_for_key_type(key_type)
            .await?
            .generate_key(key_type)
            .await
    }

    /// Clears both providers. Never fails; returns one report per provider.
    ///
    /// Must not run concurrently with issuance or presentation flows.
    pub async fn wipe(&self) -> Vec<CleanupReport> {
        let reports = vec![self.local.clear_all().await, self.remote.clear_all().await];
        let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
        if failures > 0 {
            log::warn!("wipe finished with {failures} failed step(s)");
        }
        reports
    }

    /// The provider factory.
    #[must_use]
    pub const fn factory(&self) -> &CryptoProviderFactory {
        &self.factory
    }

    /// The local provider.
    #[must_use]
    pub fn local(&self) -> Arc<LocalKeyProvider> {
        Arc::clone(&self.local)
    }

    /// The remote provider.
    #[must_use]
    pub fn remote(&self) -> Arc<RemoteKeyProvider> {
        Arc::clone(&self.remote)
    }

    /// The shared attestation store.
    #[must_use]
    pub const fn attestations(&self) -> &KeyAttestationStore {
        &self.store
    }
}
