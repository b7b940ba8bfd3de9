//! Persistence for key attestations and wallet-instance credentials.
//!
//! Both stores are collaborators behind traits so that a host can back them
//! with its own database. In-memory and file-backed implementations are
//! provided.

mod file;
mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::{CustodyError, CustodyResult, KeyAttestation, WalletInstanceCredentials};

pub use file::{FileAttestationTable, FileCredentialsStore};
pub(crate) use file::write_atomic;
pub use memory::{MemoryAttestationTable, MemoryCredentialsStore};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the attestation table and the credentials store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An attestation with this key identifier already exists.
    #[error("duplicate key id: {0}")]
    DuplicateKeyId(String),

    /// I/O failure of the backing file.
    #[error("storage io error: {0}")]
    Io(String),

    /// Stored data could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A writer panicked while holding the store lock.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Table of key attestations keyed by `key_id`.
///
/// Implementations must be safe for concurrent reads and inserts. `insert`
/// must write the whole record or nothing, and must fail rather than
/// overwrite when the key identifier exists.
pub trait AttestationTable: Send + Sync {
    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateKeyId`] if `key_id` already exists.
    fn insert(&self, attestation: &KeyAttestation) -> StorageResult<()>;

    /// Reads the record for `key_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key_id: &str) -> StorageResult<Option<KeyAttestation>>;

    /// Deletes the record for `key_id`; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn delete(&self, key_id: &str) -> StorageResult<bool>;

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn delete_all(&self) -> StorageResult<()>;
}

/// Persisted wallet-instance credentials.
pub trait CredentialsStore: Send + Sync {
    /// Reads the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self) -> StorageResult<Option<WalletInstanceCredentials>>;

    /// Stores credentials, replacing any previous ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, credentials: &WalletInstanceCredentials) -> StorageResult<()>;

    /// Removes the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> StorageResult<()>;
}

/// Key attestation store shared by both providers.
#[derive(Clone)]
pub struct KeyAttestationStore {
    table: Arc<dyn AttestationTable>,
}

impl KeyAttestationStore {
    /// Wraps an attestation table.
    #[must_use]
    pub fn new(table: Arc<dyn AttestationTable>) -> Self {
        Self { table }
    }

    /// Persists a freshly generated attestation.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::DuplicateKeyId`] if the key identifier is taken.
    pub fn save(&self, attestation: &KeyAttestation) -> CustodyResult<()> {
        self.table.insert(attestation).map_err(CustodyError::from)
    }

    /// Reads the attestation for `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::AttestationNotFound`] if no record exists.
    pub fn get(&self, key_id: &str) -> CustodyResult<KeyAttestation> {
        self.table
            .get(key_id)?
            .ok_or_else(|| CustodyError::AttestationNotFound {
                key_id: key_id.to_string(),
            })
    }

    /// Deletes every attestation.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be written.
    pub fn delete_all(&self) -> CustodyResult<()> {
        self.table.delete_all().map_err(CustodyError::from)
    }
}
