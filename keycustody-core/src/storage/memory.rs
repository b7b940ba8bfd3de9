//! In-memory stores. State is lost when the process exits.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{AttestationTable, CredentialsStore, StorageError, StorageResult};
use crate::{KeyAttestation, WalletInstanceCredentials};

/// Attestation table backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryAttestationTable {
    rows: RwLock<HashMap<String, KeyAttestation>>,
}

impl MemoryAttestationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Poisoned`] if the lock is poisoned.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.rows.read().map_err(|_| StorageError::Poisoned)?.len())
    }

    /// Whether the table holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Poisoned`] if the lock is poisoned.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl AttestationTable for MemoryAttestationTable {
    fn insert(&self, attestation: &KeyAttestation) -> StorageResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::Poisoned)?;
        if rows.contains_key(&attestation.key_id) {
            return Err(StorageError::DuplicateKeyId(attestation.key_id.clone()));
        }
        rows.insert(attestation.key_id.clone(), attestation.clone());
        Ok(())
    }

    fn get(&self, key_id: &str) -> StorageResult<Option<KeyAttestation>> {
        Ok(self
            .rows
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .get(key_id)
            .cloned())
    }

    fn delete(&self, key_id: &str) -> StorageResult<bool> {
        Ok(self
            .rows
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .remove(key_id)
            .is_some())
    }

    fn delete_all(&self) -> StorageResult<()> {
        self.rows.write().map_err(|_| StorageError::Poisoned)?.clear();
        Ok(())
    }
}

/// Credentials store holding a single value in memory.
#[derive(Default)]
pub struct MemoryCredentialsStore {
    credentials: RwLock<Option<WalletInstanceCredentials>>,
}

impl MemoryCredentialsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: WalletInstanceCredentials) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
        }
    }
}

impl CredentialsStore for MemoryCredentialsStore {
    fn get(&self) -> StorageResult<Option<WalletInstanceCredentials>> {
        Ok(self
            .credentials
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .clone())
    }

    fn set(&self, credentials: &WalletInstanceCredentials) -> StorageResult<()> {
        *self.credentials.write().map_err(|_| StorageError::Poisoned)? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.credentials.write().map_err(|_| StorageError::Poisoned)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::KeyType;

    #[test]
    fn test_delete_reports_presence() {
        let table = MemoryAttestationTable::new();
        table
            .insert(&KeyAttestation {
                key_id: "k1".to_string(),
                attestation: "a".to_string(),
                key_type: KeyType::Rsa,
                provider: ProviderKind::Remote,
            })
            .expect("insert");

        assert!(table.delete("k1").expect("delete"));
        assert!(!table.delete("k1").expect("delete again"));
        assert!(table.is_empty().expect("len"));
    }

    #[test]
    fn test_credentials_set_and_clear() {
        let store = MemoryCredentialsStore::new();
        assert!(store.get().expect("get").is_none());

        let credentials = WalletInstanceCredentials {
            instance_id: "i".to_string(),
            instance_secret: "s".to_string(),
        };
        store.set(&credentials).expect("set");
        assert_eq!(store.get().expect("get"), Some(credentials));

        store.clear().expect("clear");
        assert!(store.get().expect("get").is_none());
    }
}
