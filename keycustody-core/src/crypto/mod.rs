//! Signature primitives for the two supported key families.
//!
//! Private keys cross this module as PKCS#8 DER and public keys as SPKI DER,
//! the encodings a keystore hands back. Signatures use the raw JWS encodings:
//! `r || s` for ES256 and the PSS octet string for PS256.

mod ec;
mod rsa_pss;

use zeroize::Zeroizing;

use crate::jose::{JwsAlgorithm, PublicJwk};
use crate::keystore::KeyParameters;
use crate::{CustodyError, CustodyResult, KeyType};

/// A freshly generated key pair.
pub struct GeneratedKey {
    /// PKCS#8 DER private key.
    pub private_pkcs8: Zeroizing<Vec<u8>>,
    /// SPKI DER public key.
    pub public_spki: Vec<u8>,
}

/// Generates a key pair for the given parameters.
///
/// # Errors
///
/// Returns [`CustodyError::InvalidInput`] for an unsupported curve or RSA size,
/// or [`CustodyError::Crypto`] if generation or encoding fails.
pub fn generate(parameters: &KeyParameters) -> CustodyResult<GeneratedKey> {
    match parameters {
        KeyParameters::Ec { curve } if curve == ec::CURVE => ec::generate(),
        KeyParameters::Ec { curve } => Err(CustodyError::InvalidInput {
            attribute: "curve".to_string(),
            reason: format!("unsupported curve {curve}"),
        }),
        KeyParameters::Rsa {
            modulus_bits,
            public_exponent,
        } => rsa_pss::generate(*modulus_bits, *public_exponent),
    }
}

/// Derives the public JWK of an SPKI DER public key.
///
/// # Errors
///
/// Returns [`CustodyError::Crypto`] if the key cannot be decoded as `key_type`.
pub fn public_jwk(key_type: KeyType, public_spki: &[u8]) -> CustodyResult<PublicJwk> {
    match key_type {
        KeyType::Ec => ec::public_jwk(public_spki),
        KeyType::Rsa => rsa_pss::public_jwk(public_spki),
    }
}

/// Signs `data` with the algorithm implied by `key_type`.
///
/// # Errors
///
/// Returns [`CustodyError::Crypto`] if the private key cannot be decoded or
/// signing fails.
pub fn sign(key_type: KeyType, private_pkcs8: &[u8], data: &[u8]) -> CustodyResult<Vec<u8>> {
    match key_type {
        KeyType::Ec => ec::sign(private_pkcs8, data),
        KeyType::Rsa => rsa_pss::sign(private_pkcs8, data),
    }
}

/// Verifies a raw JWS signature over `data` against a public JWK.
///
/// # Errors
///
/// Returns [`CustodyError::UnsupportedAlgorithm`] if `algorithm` is not the one
/// this crate produces for the JWK's family, and [`CustodyError::Crypto`] if
/// the signature does not verify.
pub fn verify_signature(
    jwk: &PublicJwk,
    algorithm: JwsAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> CustodyResult<()> {
    if algorithm != jwk.key_type().signing_algorithm() {
        return Err(CustodyError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        });
    }
    match jwk {
        PublicJwk::Ec { crv, x, y } => ec::verify(crv, x, y, data, signature),
        PublicJwk::Rsa { n, e } => rsa_pss::verify(n, e, data, signature),
    }
}

fn crypto_err(error: impl std::fmt::Display) -> CustodyError {
    CustodyError::Crypto {
        error: error.to_string(),
    }
}
