//! Signer shapes built on top of a provider key.
//!
//! Every adapter resolves the key's attestation once, at construction, and
//! reports the algorithm implied by its key type. None of them reveal which
//! provider holds the key, except [`CoseDeviceSigner`] which needs a handle
//! on the key in the device keystore.

mod cose;
mod key_binding;
mod proof;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::jose::{b64_encode, encode_segment, JwsAlgorithm, JwsHeader, PublicJwk};
use crate::provider::CryptoProvider;
use crate::{CustodyError, CustodyResult, KeyAttestation};

pub use cose::{cose_algorithm, cose_algorithm_from_name, CoseDeviceSigner};
pub use key_binding::{KeyBindingClaims, KeyBindingSigner};
pub use proof::{BindingKey, ProofClaims, ProofOfPossessionSigner};

/// A raw JWS signer: one algorithm, signs a JWS signing input.
#[async_trait]
pub trait JwsSigner: Send + Sync {
    /// The only algorithm this signer produces.
    fn algorithm(&self) -> JwsAlgorithm;

    /// Signs `signing_input`, returning the raw JWS signature bytes.
    async fn sign(&self, signing_input: &[u8]) -> CustodyResult<Vec<u8>>;
}

/// [`JwsSigner`] backed by a provider key.
#[derive(Clone)]
pub struct ProviderSigner {
    provider: Arc<dyn CryptoProvider>,
    attestation: KeyAttestation,
}

impl ProviderSigner {
    /// Binds a signer to `key_id` on `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no attestation for the key.
    pub async fn new(provider: Arc<dyn CryptoProvider>, key_id: &str) -> CustodyResult<Self> {
        let attestation = provider.get_key_attestation(key_id).await?;
        Ok(Self {
            provider,
            attestation,
        })
    }

    /// Identifier of the signing key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.attestation.key_id
    }

    /// Attestation of the signing key.
    #[must_use]
    pub const fn attestation(&self) -> &KeyAttestation {
        &self.attestation
    }

    /// Public key of the signing key, as attested.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidAttestation`] if the attestation carries
    /// no usable JWK.
    pub fn public_jwk(&self) -> CustodyResult<PublicJwk> {
        self.attestation.public_jwk()
    }
}

#[async_trait]
impl JwsSigner for ProviderSigner {
    fn algorithm(&self) -> JwsAlgorithm {
        self.attestation.algorithm()
    }

    async fn sign(&self, signing_input: &[u8]) -> CustodyResult<Vec<u8>> {
        self.provider
            .sign(&self.attestation.key_id, signing_input)
            .await
    }
}

/// Produces a JWS in compact serialization.
///
/// # Errors
///
/// Returns [`CustodyError::UnsupportedAlgorithm`] if `header.alg` is not the
/// signer's algorithm, or any error of the signer.
pub async fn sign_compact<S, T>(signer: &S, header: &JwsHeader, claims: &T) -> CustodyResult<String>
where
    S: JwsSigner + ?Sized,
    T: Serialize + Sync + ?Sized,
{
    if header.alg != signer.algorithm() {
        return Err(CustodyError::UnsupportedAlgorithm {
            algorithm: header.alg.to_string(),
        });
    }

    let signing_input = format!("{}.{}", encode_segment(header)?, encode_segment(claims)?);
    let signature = signer.sign(signing_input.as_bytes()).await?;
    Ok(format!("{signing_input}.{}", b64_encode(signature)))
}
