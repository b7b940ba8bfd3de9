use std::sync::Arc;

use async_trait::async_trait;

use super::{Cleanup, CleanupReport, CryptoProvider, KeyPair, ProviderKind, ProviderOperation};
use crate::storage::{CredentialsStore, KeyAttestationStore};
use crate::wallet_provider::WalletProviderClient;
use crate::{CustodyError, CustodyResult, KeyAttestation, KeyType, WalletInstanceCredentials};

/// Provider for keys held by the wallet-provider service.
///
/// No private key material exists on the device. Signing is a network call
/// authenticated with the wallet-instance credentials.
pub struct RemoteKeyProvider {
    store: KeyAttestationStore,
    credentials: Arc<dyn CredentialsStore>,
    client: Arc<dyn WalletProviderClient>,
}

impl RemoteKeyProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(
        store: KeyAttestationStore,
        credentials: Arc<dyn CredentialsStore>,
        client: Arc<dyn WalletProviderClient>,
    ) -> Self {
        Self {
            store,
            credentials,
            client,
        }
    }

    fn credentials(&self) -> CustodyResult<WalletInstanceCredentials> {
        self.credentials.get()?.ok_or(CustodyError::NotRegistered)
    }

    async fn generate(&self, key_type: KeyType) -> CustodyResult<KeyAttestation> {
        let credentials = self.credentials()?;
        let mut record = self.client.generate_key(key_type, &credentials).await?;
        record.provider = ProviderKind::Remote;

        let attested_type = record.public_jwk()?.key_type();
        if record.key_type != key_type || attested_type != key_type {
            return Err(CustodyError::InvalidAttestation {
                reason: format!("requested a {key_type} key, attestation binds {attested_type}"),
            });
        }

        self.store.save(&record)?;
        log::info!("generated remote {key_type} key {}", record.key_id);
        Ok(record)
    }

    fn key_pair(&self, key_id: &str) -> CustodyResult<KeyPair> {
        let record = self.store.get(key_id)?;
        Ok(KeyPair {
            key_id: record.key_id.clone(),
            key_type: record.key_type,
            public_jwk: record.public_jwk()?,
            device_key: None,
        })
    }

    async fn sign_remotely(&self, key_id: &str, data: &[u8]) -> CustodyResult<Vec<u8>> {
        let record = self.store.get(key_id)?;
        let credentials = self.credentials()?;
        self.client.sign(&record, data, &credentials).await
    }
}

#[async_trait]
impl CryptoProvider for RemoteKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    /// Asks the wallet-provider. An unreachable service supports nothing.
    async fn supports(&self, key_type: KeyType) -> bool {
        match self.client.supports_key(key_type).await {
            Ok(supported) => supported,
            Err(e) => {
                log::warn!("remote provider could not check support for {key_type}: {e}");
                false
            }
        }
    }

    async fn generate_key(&self, key_type: KeyType) -> CustodyResult<KeyAttestation> {
        self.generate(key_type)
            .await
            .map_err(|e| e.during(ProviderKind::Remote, ProviderOperation::GenerateKey))
    }

    async fn get_key_attestation(&self, key_id: &str) -> CustodyResult<KeyAttestation> {
        self.store
            .get(key_id)
            .map_err(|e| e.during(ProviderKind::Remote, ProviderOperation::GetKeyAttestation))
    }

    async fn get_key_pair(&self, key_id: &str) -> CustodyResult<KeyPair> {
        self.key_pair(key_id)
            .map_err(|e| e.during(ProviderKind::Remote, ProviderOperation::GetKeyPair))
    }

    async fn sign(&self, key_id: &str, data: &[u8]) -> CustodyResult<Vec<u8>> {
        self.sign_remotely(key_id, data)
            .await
            .map_err(|e| e.during(ProviderKind::Remote, ProviderOperation::Sign))
    }

    /// Forgets the wallet-instance credentials and every attestation. Keys on
    /// the service are not touched.
    async fn clear_all(&self) -> CleanupReport {
        let mut cleanup = Cleanup::new(ProviderKind::Remote);
        cleanup.step("credentials", self.credentials.clear().map_err(Into::into));
        cleanup.step("attestations", self.store.delete_all());
        cleanup.finish()
    }
}
