//! Client side of the wallet-provider service.
//!
//! The wallet-provider registers app instances, attests locally generated keys,
//! and generates and uses keys on behalf of the [`RemoteKeyProvider`].
//!
//! [`RemoteKeyProvider`]: crate::RemoteKeyProvider

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::jose::PublicJwk;
use crate::{CustodyResult, KeyAttestation, KeyType, WalletInstanceCredentials};

pub use http::HttpWalletProviderClient;

/// Description of the app instance sent at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct DeviceInfo {
    /// Operating system family, e.g. `android`.
    pub platform: String,
    /// Operating system version.
    pub os_version: String,
    /// Version of the wallet app.
    pub app_version: String,
    /// Device model, if the host chooses to share it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// RPC contract of the wallet-provider service.
///
/// Every method except [`register_instance`](Self::register_instance) and
/// [`supports_key`](Self::supports_key) authenticates with the wallet-instance
/// credentials. Implementations report transport failures as
/// [`CustodyError::NetworkError`](crate::CustodyError::NetworkError) and must
/// not retry on behalf of the providers beyond transient failures.
#[async_trait]
pub trait WalletProviderClient: Send + Sync {
    /// Registers this app instance and returns its credentials.
    async fn register_instance(
        &self,
        device_info: &DeviceInfo,
    ) -> CustodyResult<WalletInstanceCredentials>;

    /// Activates a registered instance with a token delivered out of band.
    async fn activate_instance(
        &self,
        token: &str,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<()>;

    /// Requests an attestation for a locally generated public key.
    async fn attest_key(
        &self,
        key_id: &str,
        key_type: KeyType,
        public_jwk: &PublicJwk,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<String>;

    /// Generates a key on the service and returns its attestation.
    async fn generate_key(
        &self,
        key_type: KeyType,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<KeyAttestation>;

    /// Signs `data` with the service-held key named by `attestation`.
    ///
    /// Returns [`CustodyError::AttestationNotFound`](crate::CustodyError::AttestationNotFound)
    /// if the service does not know the key.
    async fn sign(
        &self,
        attestation: &KeyAttestation,
        data: &[u8],
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<Vec<u8>>;

    /// Whether the service can generate keys of `key_type`.
    async fn supports_key(&self, key_type: KeyType) -> CustodyResult<bool>;
}
