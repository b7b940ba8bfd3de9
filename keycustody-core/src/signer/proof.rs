use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{sign_compact, JwsSigner, ProviderSigner};
use crate::jose::{JwsAlgorithm, JwsHeader, PublicJwk};
use crate::provider::CryptoProvider;
use crate::CustodyResult;

const PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";

/// How the issued credential is bound to the holder key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKey {
    /// The key itself, carried in the `jwk` header.
    Jwk(PublicJwk),
    /// A reference to the key (e.g. a DID URL), carried in the `kid` header.
    KeyId(String),
}

/// Claims of an `OpenID4VCI` proof JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Client identifier of the wallet, omitted for anonymous pre-authorized flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Credential issuer identifier.
    pub aud: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// `c_nonce` from the issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Proof-of-possession signer used during credential issuance.
#[derive(Clone)]
pub struct ProofOfPossessionSigner {
    signer: ProviderSigner,
    binding_key: BindingKey,
}

impl ProofOfPossessionSigner {
    /// Binds a proof signer to `key_id` on `provider`. The binding key is the
    /// attested JWK.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has no attestation or the attestation has
    /// no public key.
    pub async fn new(provider: Arc<dyn CryptoProvider>, key_id: &str) -> CustodyResult<Self> {
        let signer = ProviderSigner::new(provider, key_id).await?;
        let binding_key = BindingKey::Jwk(signer.public_jwk()?);
        Ok(Self {
            signer,
            binding_key,
        })
    }

    /// Refers to the key by identifier instead of embedding the JWK.
    #[must_use]
    pub fn with_key_id(mut self, kid: impl Into<String>) -> Self {
        self.binding_key = BindingKey::KeyId(kid.into());
        self
    }

    /// The binding key descriptor.
    #[must_use]
    pub const fn binding_key(&self) -> &BindingKey {
        &self.binding_key
    }

    /// The underlying JWS signer.
    #[must_use]
    pub const fn signer(&self) -> &ProviderSigner {
        &self.signer
    }

    /// Produces an `openid4vci-proof+jwt` over `claims`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub async fn proof_jwt(&self, claims: &ProofClaims) -> CustodyResult<String> {
        let mut header = JwsHeader::new(self.algorithm()).with_typ(PROOF_JWT_TYPE);
        match &self.binding_key {
            BindingKey::Jwk(jwk) => header = header.with_jwk(jwk.clone()),
            BindingKey::KeyId(kid) => header.kid = Some(kid.clone()),
        }
        sign_compact(&self.signer, &header, claims).await
    }
}

#[async_trait]
impl JwsSigner for ProofOfPossessionSigner {
    fn algorithm(&self) -> JwsAlgorithm {
        self.signer.algorithm()
    }

    async fn sign(&self, signing_input: &[u8]) -> CustodyResult<Vec<u8>> {
        self.signer.sign(signing_input).await
    }
}
