//! File-backed stores.
//!
//! Each store is a single JSON document. Writes go to a temporary file which is
//! synced and then renamed over the document, so a reader sees either the old
//! or the new content and never a partial record.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

use super::{AttestationTable, CredentialsStore, StorageError, StorageResult};
use crate::{KeyAttestation, WalletInstanceCredentials};

/// Permissions of every file written here: they hold private keys and the
/// wallet-instance secret.
#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

/// Writes `bytes` to `path` through a temporary sibling file and a rename.
/// On unix the file is readable by its owner only.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut file = open_private(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(PRIVATE_FILE_MODE)
        .open(path)?;
    // a stale temporary file keeps its old mode
    file.set_permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e.to_string())),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes).map_err(|e| StorageError::Io(e.to_string()))
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
    }
    Ok(())
}

/// Attestation table persisted as one JSON document.
///
/// Rows are cached in memory; every mutation rewrites the document while the
/// table lock is held.
pub struct FileAttestationTable {
    path: PathBuf,
    rows: Mutex<BTreeMap<String, KeyAttestation>>,
}

impl FileAttestationTable {
    /// Opens (or creates on first write) the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let rows = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn commit(&self, rows: &BTreeMap<String, KeyAttestation>) -> StorageResult<()> {
        write_json(&self.path, rows)
    }
}

impl AttestationTable for FileAttestationTable {
    fn insert(&self, attestation: &KeyAttestation) -> StorageResult<()> {
        let mut rows = self.rows.lock().map_err(|_| StorageError::Poisoned)?;
        if rows.contains_key(&attestation.key_id) {
            return Err(StorageError::DuplicateKeyId(attestation.key_id.clone()));
        }

        let mut next = rows.clone();
        next.insert(attestation.key_id.clone(), attestation.clone());
        self.commit(&next)?;
        *rows = next;
        Ok(())
    }

    fn get(&self, key_id: &str) -> StorageResult<Option<KeyAttestation>> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .get(key_id)
            .cloned())
    }

    fn delete(&self, key_id: &str) -> StorageResult<bool> {
        let mut rows = self.rows.lock().map_err(|_| StorageError::Poisoned)?;
        if !rows.contains_key(key_id) {
            return Ok(false);
        }

        let mut next = rows.clone();
        next.remove(key_id);
        self.commit(&next)?;
        *rows = next;
        Ok(true)
    }

    fn delete_all(&self) -> StorageResult<()> {
        let mut rows = self.rows.lock().map_err(|_| StorageError::Poisoned)?;
        self.commit(&BTreeMap::new())?;
        rows.clear();
        Ok(())
    }
}

/// Credentials store persisted as one JSON document.
pub struct FileCredentialsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialsStore {
    /// Opens the store at `path`. The file is created on the first `set`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }
}

impl CredentialsStore for FileCredentialsStore {
    fn get(&self) -> StorageResult<Option<WalletInstanceCredentials>> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        read_json(&self.path)
    }

    fn set(&self, credentials: &WalletInstanceCredentials) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        write_json(&self.path, credentials)
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}
