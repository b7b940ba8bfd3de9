use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{sign_compact, JwsSigner, ProviderSigner};
use crate::jose::{JwsAlgorithm, JwsHeader, PublicJwk};
use crate::provider::CryptoProvider;
use crate::CustodyResult;

const KEY_BINDING_JWT_TYPE: &str = "kb+jwt";

/// Claims of an SD-JWT key-binding JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindingClaims {
    /// Intended verifier.
    pub aud: String,
    /// Verifier-provided nonce.
    pub nonce: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Base64url digest over the presented SD-JWT.
    pub sd_hash: String,
}

/// Holder-binding signer for SD-JWT presentations.
///
/// Exposes the public key the credential's `cnf` claim refers to together
/// with the signer, so that the presentation can be bound to both.
#[derive(Clone)]
pub struct KeyBindingSigner {
    signer: ProviderSigner,
    public_jwk: PublicJwk,
}

impl KeyBindingSigner {
    /// Binds a key-binding signer to `key_id` on `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has no attestation or the attestation has
    /// no public key.
    pub async fn new(provider: Arc<dyn CryptoProvider>, key_id: &str) -> CustodyResult<Self> {
        let signer = ProviderSigner::new(provider, key_id).await?;
        let public_jwk = signer.public_jwk()?;
        Ok(Self { signer, public_jwk })
    }

    /// The holder public key.
    #[must_use]
    pub const fn public_jwk(&self) -> &PublicJwk {
        &self.public_jwk
    }

    /// The underlying JWS signer.
    #[must_use]
    pub const fn signer(&self) -> &ProviderSigner {
        &self.signer
    }

    /// Produces a `kb+jwt` over `claims`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub async fn key_binding_jwt(&self, claims: &KeyBindingClaims) -> CustodyResult<String> {
        let header = JwsHeader::new(self.algorithm()).with_typ(KEY_BINDING_JWT_TYPE);
        sign_compact(&self.signer, &header, claims).await
    }
}

#[async_trait]
impl JwsSigner for KeyBindingSigner {
    fn algorithm(&self) -> JwsAlgorithm {
        self.signer.algorithm()
    }

    async fn sign(&self, signing_input: &[u8]) -> CustodyResult<Vec<u8>> {
        self.signer.sign(signing_input).await
    }
}
