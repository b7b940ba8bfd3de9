use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::jose::{self, JwsAlgorithm, PublicJwk};
use crate::provider::ProviderKind;
use crate::CustodyResult;

/// Family of an asymmetric key. Determines the signing algorithm and which
/// providers can hold it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    uniffi::Enum,
)]
#[strum(ascii_case_insensitive)]
pub enum KeyType {
    /// Elliptic curve key on P-256.
    #[serde(rename = "EC")]
    #[strum(to_string = "EC")]
    Ec,
    /// RSA key.
    #[serde(rename = "RSA")]
    #[strum(to_string = "RSA")]
    Rsa,
}

impl KeyType {
    /// The JWS algorithm used to sign with keys of this type.
    #[must_use]
    pub const fn signing_algorithm(self) -> JwsAlgorithm {
        match self {
            Self::Ec => JwsAlgorithm::ES256,
            Self::Rsa => JwsAlgorithm::PS256,
        }
    }
}

/// A previously generated key together with the attestation binding its public
/// key to this wallet instance.
///
/// The attestation is kept as the opaque string issued by the wallet provider;
/// the public key and algorithm are derived on demand. `provider` records
/// which provider created the key; lookups by key id resolve to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct KeyAttestation {
    /// Unique identifier of the key, assigned at generation time.
    pub key_id: String,
    /// Serialized attestation (compact JWS).
    pub attestation: String,
    /// Family of the attested key.
    pub key_type: KeyType,
    /// Provider holding the key.
    pub provider: ProviderKind,
}

impl KeyAttestation {
    /// Extracts the attested public key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CustodyError::InvalidAttestation`] if the blob is not a
    /// compact JWS or carries no JWK.
    pub fn public_jwk(&self) -> CustodyResult<PublicJwk> {
        jose::attested_public_jwk(&self.attestation)
    }

    /// The signing algorithm implied by the key type.
    #[must_use]
    pub const fn algorithm(&self) -> JwsAlgorithm {
        self.key_type.signing_algorithm()
    }
}

/// Identifier and secret issued by the wallet provider when this app instance
/// registered. Authenticates every remote key operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct WalletInstanceCredentials {
    /// Wallet instance identifier.
    pub instance_id: String,
    /// Wallet instance secret.
    pub instance_secret: String,
}

impl fmt::Debug for WalletInstanceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletInstanceCredentials")
            .field("instance_id", &self.instance_id)
            .field("instance_secret", &"<redacted>")
            .finish()
    }
}
