use thiserror::Error;

use crate::keystore::KeystoreError;
use crate::provider::{ProviderKind, ProviderOperation};
use crate::storage::StorageError;
use crate::KeyType;

/// Result alias used throughout the crate.
pub type CustodyResult<T, E = CustodyError> = std::result::Result<T, E>;

/// Error outputs from key custody operations.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum CustodyError {
    /// None of the configured providers supports the requested key type.
    #[error("no_provider_for_key_type: {key_type}")]
    NoProviderForKeyType {
        /// The key type that was requested.
        key_type: KeyType,
    },
    /// The algorithm has no mapping in the signing stack.
    #[error("unsupported_algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The algorithm name as it was presented.
        algorithm: String,
    },
    /// No attestation is stored (or known remotely) for the key.
    #[error("attestation_not_found: {key_id}")]
    AttestationNotFound {
        /// Identifier of the key.
        key_id: String,
    },
    /// An attestation with the same key identifier already exists.
    #[error("duplicate_key_id: {key_id}")]
    DuplicateKeyId {
        /// Identifier of the key.
        key_id: String,
    },
    /// The wallet instance has not been registered with the wallet provider.
    #[error("not_registered")]
    NotRegistered,
    /// The key pair has no private component (e.g. a remote key).
    #[error("missing_private_key: {key_id}")]
    MissingPrivateKey {
        /// Identifier of the key.
        key_id: String,
    },
    /// The attestation blob could not be interpreted.
    #[error("invalid_attestation: {reason}")]
    InvalidAttestation {
        /// What was wrong with it.
        reason: String,
    },
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid.
        attribute: String,
        /// The reason the input is invalid.
        reason: String,
    },
    /// Failure reported by the secure keystore.
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    /// Failure reported by the attestation table or credentials store.
    #[error(transparent)]
    Storage(StorageError),
    /// Network connection error with details.
    #[error("network_error at {url}, status code {status:?}: {error}")]
    NetworkError {
        /// The URL that was requested.
        url: String,
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Error message.
        error: String,
    },
    /// Unexpected error serializing or deserializing information.
    #[error("serialization_error: {error}")]
    SerializationError {
        /// The error message.
        error: String,
    },
    /// A signing or key decoding primitive failed.
    #[error("crypto_error: {error}")]
    Crypto {
        /// The error message.
        error: String,
    },
    /// A provider operation failed; carries which provider and which operation.
    #[error("{provider} provider failed to {operation}: {source}")]
    Provider {
        /// The provider that failed.
        provider: ProviderKind,
        /// The operation that failed.
        operation: ProviderOperation,
        /// The underlying failure.
        source: Box<CustodyError>,
    },
}

/// Coarse classification of a [`CustodyError`], used by callers to pick a
/// user-facing message or a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup defect; never retried.
    Configuration,
    /// A key or attestation is unknown.
    NotFound,
    /// The wallet instance must (re-)register.
    Registration,
    /// Network or wallet-provider failure.
    Remote,
    /// Secure keystore failure.
    Keystore,
    /// Local persistence failure.
    Storage,
    /// Cryptographic failure.
    Crypto,
    /// Bad input or malformed data.
    InvalidInput,
}

impl CustodyError {
    /// Classifies the error, looking through the provider context wrapper.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProviderForKeyType { .. }
            | Self::UnsupportedAlgorithm { .. }
            | Self::MissingPrivateKey { .. } => ErrorKind::Configuration,
            Self::AttestationNotFound { .. } => ErrorKind::NotFound,
            Self::NotRegistered => ErrorKind::Registration,
            Self::NetworkError { .. } | Self::SerializationError { .. } => {
                ErrorKind::Remote
            }
            Self::Keystore(_) => ErrorKind::Keystore,
            Self::DuplicateKeyId { .. } | Self::Storage(_) => ErrorKind::Storage,
            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::InvalidAttestation { .. } | Self::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            Self::Provider { source, .. } => source.kind(),
        }
    }

    /// The provider whose operation failed, if known.
    #[must_use]
    pub const fn provider(&self) -> Option<ProviderKind> {
        match self {
            Self::Provider { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// The provider operation that failed, if known.
    #[must_use]
    pub const fn operation(&self) -> Option<ProviderOperation> {
        match self {
            Self::Provider { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// The innermost error, without provider context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Provider { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attaches provider context. Errors that already carry context keep the
    /// innermost provider and operation.
    pub(crate) fn during(self, provider: ProviderKind, operation: ProviderOperation) -> Self {
        match self {
            wrapped @ Self::Provider { .. } => wrapped,
            other => Self::Provider {
                provider,
                operation,
                source: Box::new(other),
            },
        }
    }
}

impl From<StorageError> for CustodyError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::DuplicateKeyId(key_id) => Self::DuplicateKeyId { key_id },
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError {
            error: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for CustodyError {
    fn from(error: reqwest::Error) -> Self {
        Self::NetworkError {
            url: error
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: error.status().map(|status| status.as_u16()),
            error: error.to_string(),
        }
    }
}
