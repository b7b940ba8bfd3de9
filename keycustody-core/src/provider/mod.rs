//! Key providers: one contract, two custody models.
//!
//! [`LocalKeyProvider`] holds keys in the device keystore and has them attested
//! by the wallet-provider. [`RemoteKeyProvider`] leaves key generation and
//! signing to the wallet-provider and only keeps attestations locally. The
//! [`CryptoProviderFactory`] picks between them by key type.

mod factory;
mod local;
mod remote;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::jose::{JwsAlgorithm, PublicJwk};
use crate::keystore::{DeviceKey, KeystoreError};
use crate::{CustodyError, CustodyResult, KeyAttestation, KeyType};

pub use factory::CryptoProviderFactory;
pub use local::LocalKeyProvider;
pub use remote::RemoteKeyProvider;

/// The two custody models. Recorded with every attestation so that an
/// existing key always resolves to the provider that created it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, uniffi::Enum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Keys live in the device keystore.
    Local,
    /// Keys live on the wallet-provider service.
    Remote,
}

/// Provider operations, used to report which step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderOperation {
    /// `generate_key`
    GenerateKey,
    /// `get_key_attestation`
    GetKeyAttestation,
    /// `get_key_pair`
    GetKeyPair,
    /// `sign`
    Sign,
}

/// A key pair as seen by a provider.
///
/// `device_key` is only present for keys whose private half lives in the
/// device keystore; it signs through the keystore and never exposes the key.
/// Remote keys always carry `None`.
#[derive(Clone)]
pub struct KeyPair {
    /// Identifier of the key.
    pub key_id: String,
    /// Family of the key.
    pub key_type: KeyType,
    /// Public key.
    pub public_jwk: PublicJwk,
    /// Handle on the private key in the device keystore.
    pub device_key: Option<DeviceKey>,
}

impl KeyPair {
    /// The JWS algorithm used with this key.
    #[must_use]
    pub const fn algorithm(&self) -> JwsAlgorithm {
        self.key_type.signing_algorithm()
    }

    /// Whether the private half is reachable on this device.
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.device_key.is_some()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("key_type", &self.key_type)
            .field("public_jwk", &self.public_jwk)
            .field("device_key", &self.device_key)
            .finish()
    }
}

/// One cleanup step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Name of the step, e.g. `keystore`.
    pub step: &'static str,
    /// Rendered error.
    pub error: String,
}

/// Outcome of [`CryptoProvider::clear_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// The provider that ran the cleanup.
    pub provider: ProviderKind,
    /// Steps that failed. Every other step completed.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every step completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs independent cleanup steps, recording failures instead of stopping.
pub(crate) struct Cleanup {
    report: CleanupReport,
}

impl Cleanup {
    pub(crate) const fn new(provider: ProviderKind) -> Self {
        Self {
            report: CleanupReport {
                provider,
                failures: Vec::new(),
            },
        }
    }

    pub(crate) fn step(&mut self, step: &'static str, result: CustodyResult<()>) {
        if let Err(error) = result {
            log::warn!(
                "{} provider cleanup step {step} failed: {error}",
                self.report.provider
            );
            self.report.failures.push(CleanupFailure {
                step,
                error: error.to_string(),
            });
        }
    }

    pub(crate) fn finish(self) -> CleanupReport {
        if self.report.is_clean() {
            log::info!("{} provider cleared", self.report.provider);
        }
        self.report
    }
}

/// Runs keystore and key-generation work on the blocking thread pool, so a
/// slow keystore or an RSA key generation does not stall the async executor.
/// Requires a Tokio runtime.
pub(crate) async fn blocking<T, F>(work: F) -> CustodyResult<T>
where
    F: FnOnce() -> CustodyResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        CustodyError::Keystore(KeystoreError::Unavailable(format!(
            "keystore task did not complete: {e}"
        )))
    })?
}

/// The contract shared by every key provider.
///
/// Operations on distinct keys may run concurrently. Concurrent use of the same
/// key is only as safe as the keystore or remote service behind the provider.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Which custody model this provider implements.
    fn kind(&self) -> ProviderKind;

    /// Whether keys of `key_type` should be requested from this provider.
    async fn supports(&self, key_type: KeyType) -> bool;

    /// Generates a key, obtains its attestation and persists it.
    async fn generate_key(&self, key_type: KeyType) -> CustodyResult<KeyAttestation>;

    /// Reads the stored attestation of `key_id`.
    async fn get_key_attestation(&self, key_id: &str) -> CustodyResult<KeyAttestation>;

    /// Returns the key pair of `key_id`, with the private half when reachable.
    async fn get_key_pair(&self, key_id: &str) -> CustodyResult<KeyPair>;

    /// Signs `data` with `key_id`, returning the raw JWS signature.
    async fn sign(&self, key_id: &str, data: &[u8]) -> CustodyResult<Vec<u8>>;

    /// Best-effort wipe. Never fails; failed steps are logged and reported.
    async fn clear_all(&self) -> CleanupReport;
}
