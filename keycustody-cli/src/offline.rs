//! Wallet-provider stand-in for commands that work on local state only.

use async_trait::async_trait;
use keycustody_core::jose::PublicJwk;
use keycustody_core::wallet_provider::{DeviceInfo, WalletProviderClient};
use keycustody_core::{
    CustodyError, CustodyResult, KeyAttestation, KeyType, WalletInstanceCredentials,
};

/// Fails every RPC, asking for a provider URL.
///
/// Used when no `--provider-url` is given, so `attestation` and `wipe` run
/// without a service while networked commands still report what is missing.
pub struct OfflineWalletProvider;

fn missing_url() -> CustodyError {
    CustodyError::InvalidInput {
        attribute: "provider_url".to_string(),
        reason: "--provider-url or KEYCUSTODY_PROVIDER_URL is required for this command"
            .to_string(),
    }
}

#[async_trait]
impl WalletProviderClient for OfflineWalletProvider {
    async fn register_instance(
        &self,
        _device_info: &DeviceInfo,
    ) -> CustodyResult<WalletInstanceCredentials> {
        Err(missing_url())
    }

    async fn activate_instance(
        &self,
        _token: &str,
        _credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<()> {
        Err(missing_url())
    }

    async fn attest_key(
        &self,
        _key_id: &str,
        _key_type: KeyType,
        _public_jwk: &PublicJwk,
        _credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<String> {
        Err(missing_url())
    }

    async fn generate_key(
        &self,
        _key_type: KeyType,
        _credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<KeyAttestation> {
        Err(missing_url())
    }

    async fn sign(
        &self,
        _attestation: &KeyAttestation,
        _data: &[u8],
        _credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<Vec<u8>> {
        Err(missing_url())
    }

    async fn supports_key(&self, _key_type: KeyType) -> CustodyResult<bool> {
        Err(missing_url())
    }
}
