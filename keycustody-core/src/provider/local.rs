use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    blocking, Cleanup, CleanupReport, CryptoProvider, KeyPair, ProviderKind, ProviderOperation,
};
use crate::keystore::{DeviceKey, KeyGenSpec, SecureKeystore};
use crate::storage::{CredentialsStore, KeyAttestationStore};
use crate::wallet_provider::WalletProviderClient;
use crate::{crypto, CustodyError, CustodyResult, KeyAttestation, KeyType};

/// Provider for device-bound keys.
///
/// Key pairs are created in the [`SecureKeystore`] under a random alias that
/// doubles as the key identifier. Only the public JWK leaves the device, sent
/// to the wallet-provider to obtain an attestation.
pub struct LocalKeyProvider {
    keystore: Arc<dyn SecureKeystore>,
    store: KeyAttestationStore,
    credentials: Arc<dyn CredentialsStore>,
    client: Arc<dyn WalletProviderClient>,
}

impl LocalKeyProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(
        keystore: Arc<dyn SecureKeystore>,
        store: KeyAttestationStore,
        credentials: Arc<dyn CredentialsStore>,
        client: Arc<dyn WalletProviderClient>,
    ) -> Self {
        Self {
            keystore,
            store,
            credentials,
            client,
        }
    }

    async fn generate(&self, key_type: KeyType) -> CustodyResult<KeyAttestation> {
        let credentials = self.credentials.get()?.ok_or(CustodyError::NotRegistered)?;

        let key_id = Uuid::new_v4().to_string();
        let keystore = Arc::clone(&self.keystore);
        let alias = key_id.clone();
        let public_jwk = blocking(move || {
            let public_spki = keystore.create_key_pair(alias, KeyGenSpec::for_key_type(key_type))?;
            crypto::public_jwk(key_type, &public_spki)
        })
        .await?;

        let attestation = self
            .client
            .attest_key(&key_id, key_type, &public_jwk, &credentials)
            .await?;
        let record = KeyAttestation {
            key_id,
            attestation,
            key_type,
            provider: ProviderKind::Local,
        };
        if record.public_jwk()? != public_jwk {
            return Err(CustodyError::InvalidAttestation {
                reason: "attested key does not match the generated key".to_string(),
            });
        }

        let store = self.store.clone();
        let record = blocking(move || store.save(&record).map(|()| record)).await?;
        log::info!("generated local {key_type} key {}", record.key_id);
        Ok(record)
    }

    async fn key_pair(&self, key_id: &str) -> CustodyResult<KeyPair> {
        let keystore = Arc::clone(&self.keystore);
        let alias = key_id.to_string();
        blocking(move || {
            let stored = keystore.public_key(alias.clone())?;
            Ok(KeyPair {
                public_jwk: crypto::public_jwk(stored.key_type, &stored.public_key)?,
                key_type: stored.key_type,
                device_key: Some(DeviceKey::new(keystore, alias.clone(), stored.key_type)),
                key_id: alias,
            })
        })
        .await
    }

    async fn sign_with_keystore(&self, key_id: &str, data: &[u8]) -> CustodyResult<Vec<u8>> {
        // the key must still be attested
        self.store.get(key_id)?;

        let keystore = Arc::clone(&self.keystore);
        let alias = key_id.to_string();
        let data = data.to_vec();
        blocking(move || keystore.sign(alias, data).map_err(CustodyError::from)).await
    }
}

#[async_trait]
impl CryptoProvider for LocalKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    /// Only EC keys are offered. RSA keys can still be generated directly.
    async fn supports(&self, key_type: KeyType) -> bool {
        key_type == KeyType::Ec
    }

    async fn generate_key(&self, key_type: KeyType) -> CustodyResult<KeyAttestation> {
        self.generate(key_type)
            .await
            .map_err(|e| e.during(ProviderKind::Local, ProviderOperation::GenerateKey))
    }

    async fn get_key_attestation(&self, key_id: &str) -> CustodyResult<KeyAttestation> {
        self.store
            .get(key_id)
            .map_err(|e| e.during(ProviderKind::Local, ProviderOperation::GetKeyAttestation))
    }

    async fn get_key_pair(&self, key_id: &str) -> CustodyResult<KeyPair> {
        self.key_pair(key_id)
            .await
            .map_err(|e| e.during(ProviderKind::Local, ProviderOperation::GetKeyPair))
    }

    async fn sign(&self, key_id: &str, data: &[u8]) -> CustodyResult<Vec<u8>> {
        self.sign_with_keystore(key_id, data)
            .await
            .map_err(|e| e.during(ProviderKind::Local, ProviderOperation::Sign))
    }

    async fn clear_all(&self) -> CleanupReport {
        let mut cleanup = Cleanup::new(ProviderKind::Local);
        let keystore = Arc::clone(&self.keystore);
        cleanup.step(
            "keystore",
            blocking(move || keystore.clear_all().map_err(CustodyError::from)).await,
        );
        cleanup.step("attestations", self.store.delete_all());
        cleanup.finish()
    }
}
