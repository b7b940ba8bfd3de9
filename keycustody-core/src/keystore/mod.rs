//! Secure keystore collaborator used by the local provider.
//!
//! The keystore owns device-bound key pairs addressed by alias. Private keys
//! never cross this boundary: callers get the public key and ask the keystore
//! to sign. Mobile hosts implement [`SecureKeystore`] on top of the platform
//! keystore; the [`SoftwareKeystore`] in this crate serves tests and the
//! developer CLI.

mod software;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::KeyType;

pub use software::SoftwareKeystore;

/// Curve used for EC keys.
pub const EC_CURVE: &str = "P-256";
/// Modulus size used for RSA keys.
pub const RSA_MODULUS_BITS: u32 = 2048;
/// Public exponent used for RSA keys.
pub const RSA_PUBLIC_EXPONENT: u64 = 65537;

/// Errors raised by a secure keystore.
#[derive(Debug, Error, uniffi::Error)]
pub enum KeystoreError {
    /// No key is stored under the alias.
    #[error("key alias not found: {0}")]
    AliasNotFound(String),

    /// A key is already stored under the alias.
    #[error("key alias already exists: {0}")]
    AliasExists(String),

    /// The keystore refused or failed to generate the key.
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Stored key material could not be decoded.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The keystore failed to produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The keystore backend is unavailable (I/O, locked device, ...).
    #[error("keystore unavailable: {0}")]
    Unavailable(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KeystoreError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Algorithm parameters for a new key pair.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum KeyParameters {
    /// Elliptic curve key on the named curve.
    Ec {
        /// Curve name.
        curve: String,
    },
    /// RSA key.
    Rsa {
        /// Modulus size in bits.
        modulus_bits: u32,
        /// Public exponent.
        public_exponent: u64,
    },
}

/// What to generate: key algorithm, the signature algorithm the key is
/// restricted to, and the algorithm parameters.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeyGenSpec {
    /// Key algorithm.
    pub key_type: KeyType,
    /// JWS name of the only signature algorithm the key may be used with.
    pub signature_algorithm: String,
    /// Algorithm parameters.
    pub parameters: KeyParameters,
}

impl KeyGenSpec {
    /// The parameters used for keys of `key_type`: P-256 for EC, 2048-bit
    /// modulus with exponent 65537 for RSA.
    #[must_use]
    pub fn for_key_type(key_type: KeyType) -> Self {
        let parameters = match key_type {
            KeyType::Ec => KeyParameters::Ec {
                curve: EC_CURVE.to_string(),
            },
            KeyType::Rsa => KeyParameters::Rsa {
                modulus_bits: RSA_MODULUS_BITS,
                public_exponent: RSA_PUBLIC_EXPONENT,
            },
        };
        Self {
            key_type,
            signature_algorithm: key_type.signing_algorithm().to_string(),
            parameters,
        }
    }
}

/// Public half of a stored key pair.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct StoredPublicKey {
    /// Key algorithm.
    pub key_type: KeyType,
    /// SPKI DER public key.
    pub public_key: Vec<u8>,
}

/// Device keystore holding key pairs by alias.
///
/// Implementations should be hardware-backed where the platform allows it.
/// Operations on distinct aliases may run concurrently; whether concurrent
/// use of one alias is safe is up to the implementation.
#[uniffi::export(with_foreign)]
pub trait SecureKeystore: Send + Sync {
    /// Generates a key pair under `alias` and returns its SPKI DER public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias is taken or generation fails.
    fn create_key_pair(&self, alias: String, spec: KeyGenSpec) -> Result<Vec<u8>, KeystoreError>;

    /// Returns the public key stored under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::AliasNotFound`] if no key exists.
    fn public_key(&self, alias: String) -> Result<StoredPublicKey, KeystoreError>;

    /// Signs `data` with the key under `alias`, using the signature algorithm
    /// the key was generated for, and returns the raw JWS signature
    /// (`r || s` for ES256).
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::AliasNotFound`] if no key exists, or
    /// [`KeystoreError::Signing`] if the keystore refuses to sign.
    fn sign(&self, alias: String, data: Vec<u8>) -> Result<Vec<u8>, KeystoreError>;

    /// Deletes every key pair held by this keystore.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be wiped.
    fn clear_all(&self) -> Result<(), KeystoreError>;
}

/// Handle on a key pair held by a [`SecureKeystore`].
///
/// Signing goes through the keystore; the handle never holds key material.
#[derive(Clone)]
pub struct DeviceKey {
    keystore: Arc<dyn SecureKeystore>,
    alias: String,
    key_type: KeyType,
}

impl DeviceKey {
    /// A handle on the key stored under `alias`.
    #[must_use]
    pub fn new(keystore: Arc<dyn SecureKeystore>, alias: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            keystore,
            alias: alias.into(),
            key_type,
        }
    }

    /// Keystore alias of the key.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Family of the key.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Signs `data` inside the keystore.
    ///
    /// # Errors
    ///
    /// Returns the keystore's error.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeystoreError> {
        self.keystore.sign(self.alias.clone(), data.to_vec())
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKey")
            .field("alias", &self.alias)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}
