//! COSE signing for mdoc device authentication.
//!
//! mdoc signs with the device key directly, so this adapter needs a handle on
//! the key in the device keystore. Remote keys have none and are rejected up
//! front.

use std::str::FromStr;

use coset::cbor::value::Value;
use coset::{
    iana, CoseKey, CoseKeyBuilder, CoseSign1, CoseSign1Builder, HeaderBuilder,
    KeyType as CoseKty, Label,
};
use crate::jose::{b64_decode, JwsAlgorithm, PublicJwk};
use crate::keystore::DeviceKey;
use crate::provider::KeyPair;
use crate::{CustodyError, CustodyResult};

/// Maps a JWS algorithm to its COSE identifier.
///
/// ECDSA maps to ECDSA and RSA-PSS to RSA-PSS, hash for hash. Every other
/// algorithm is rejected.
///
/// # Errors
///
/// Returns [`CustodyError::UnsupportedAlgorithm`] for anything outside the
/// ES256/384/512 and PS256/384/512 families.
pub fn cose_algorithm(algorithm: JwsAlgorithm) -> CustodyResult<iana::Algorithm> {
    match algorithm {
        JwsAlgorithm::ES256 => Ok(iana::Algorithm::ES256),
        JwsAlgorithm::ES384 => Ok(iana::Algorithm::ES384),
        JwsAlgorithm::ES512 => Ok(iana::Algorithm::ES512),
        JwsAlgorithm::PS256 => Ok(iana::Algorithm::PS256),
        JwsAlgorithm::PS384 => Ok(iana::Algorithm::PS384),
        JwsAlgorithm::PS512 => Ok(iana::Algorithm::PS512),
        other => Err(CustodyError::UnsupportedAlgorithm {
            algorithm: other.to_string(),
        }),
    }
}

/// [`cose_algorithm`] for an algorithm given by name.
///
/// # Errors
///
/// Returns [`CustodyError::UnsupportedAlgorithm`] for unknown or unmapped names.
pub fn cose_algorithm_from_name(name: &str) -> CustodyResult<iana::Algorithm> {
    let algorithm =
        JwsAlgorithm::from_str(name).map_err(|_| CustodyError::UnsupportedAlgorithm {
            algorithm: name.to_string(),
        })?;
    cose_algorithm(algorithm)
}

/// Produces `COSE_Sign1` structures with a local device key.
pub struct CoseDeviceSigner {
    key_id: String,
    algorithm: iana::Algorithm,
    device_key: DeviceKey,
    public_jwk: PublicJwk,
}

impl CoseDeviceSigner {
    /// Creates a signer from a key pair holding its private key.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::MissingPrivateKey`] for key pairs without a
    /// private half, as returned by the remote provider.
    pub fn from_key_pair(key_pair: KeyPair) -> CustodyResult<Self> {
        let algorithm = cose_algorithm(key_pair.algorithm())?;
        let device_key = key_pair
            .device_key
            .ok_or_else(|| CustodyError::MissingPrivateKey {
                key_id: key_pair.key_id.clone(),
            })?;
        Ok(Self {
            key_id: key_pair.key_id,
            algorithm,
            device_key,
            public_jwk: key_pair.public_jwk,
        })
    }

    /// Identifier of the device key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// COSE algorithm placed in the protected header.
    #[must_use]
    pub const fn algorithm(&self) -> iana::Algorithm {
        self.algorithm
    }

    /// Public key of the device key as a JWK.
    #[must_use]
    pub const fn public_jwk(&self) -> &PublicJwk {
        &self.public_jwk
    }

    /// Signs `payload`, embedding it in the structure.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::Keystore`] if the keystore fails to sign.
    pub fn sign1(&self, payload: Vec<u8>, aad: &[u8]) -> CustodyResult<CoseSign1> {
        let mut sign1 = self.builder().payload(payload).build();
        sign1.signature = self.sign(&sign1.tbs_data(aad))?;
        Ok(sign1)
    }

    /// Signs `payload` without embedding it, as used for mdoc
    /// `DeviceSignature` over the detached `DeviceAuthentication` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::Keystore`] if the keystore fails to sign.
    pub fn sign1_detached(&self, payload: &[u8], aad: &[u8]) -> CustodyResult<CoseSign1> {
        let mut sign1 = self.builder().build();
        sign1.signature = self.sign(&sign1.tbs_detached_data(payload, aad))?;
        Ok(sign1)
    }

    /// The device public key as a `COSE_Key`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::SerializationError`] if the JWK coordinates are
    /// not valid base64url.
    pub fn cose_key(&self) -> CustodyResult<CoseKey> {
        let mut key = match &self.public_jwk {
            PublicJwk::Ec { x, y, .. } => CoseKeyBuilder::new_ec2_pub_key(
                iana::EllipticCurve::P_256,
                b64_decode(x)?,
                b64_decode(y)?,
            )
            .build(),
            PublicJwk::Rsa { n, e } => CoseKey {
                kty: CoseKty::Assigned(iana::KeyType::RSA),
                params: vec![
                    (
                        Label::Int(iana::RsaKeyParameter::N as i64),
                        Value::Bytes(b64_decode(n)?),
                    ),
                    (
                        Label::Int(iana::RsaKeyParameter::E as i64),
                        Value::Bytes(b64_decode(e)?),
                    ),
                ],
                ..CoseKey::default()
            },
        };
        key.alg = Some(coset::Algorithm::Assigned(self.algorithm));
        key.key_id = self.key_id.as_bytes().to_vec();
        Ok(key)
    }

    fn builder(&self) -> CoseSign1Builder {
        CoseSign1Builder::new()
            .protected(HeaderBuilder::new().algorithm(self.algorithm).build())
            .unprotected(
                HeaderBuilder::new()
                    .key_id(self.key_id.as_bytes().to_vec())
                    .build(),
            )
    }

    fn sign(&self, to_be_signed: &[u8]) -> CustodyResult<Vec<u8>> {
        self.device_key.sign(to_be_signed).map_err(CustodyError::from)
    }
}
