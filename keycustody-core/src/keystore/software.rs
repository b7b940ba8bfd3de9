//! Software implementation of [`SecureKeystore`].
//!
//! Keys live in process memory and, when opened on a directory, in one file per
//! alias. There is no hardware protection: use it for tests and development
//! tooling only.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{KeyGenSpec, KeystoreError, SecureKeystore, StoredPublicKey};
use crate::jose::{b64_decode, b64_encode};
use crate::storage::write_atomic;
use crate::{crypto, KeyType};

const KEY_FILE_EXTENSION: &str = "key";

#[derive(Clone)]
struct StoredKey {
    key_type: KeyType,
    private_key: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    key_type: KeyType,
    private_key: String,
    public_key: String,
}

/// Keystore that generates keys in software.
pub struct SoftwareKeystore {
    keys: RwLock<HashMap<String, StoredKey>>,
    dir: Option<PathBuf>,
}

impl SoftwareKeystore {
    /// Creates a keystore that keeps keys in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Opens a keystore persisted under `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Unavailable`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, KeystoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| KeystoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            keys: RwLock::new(HashMap::new()),
            dir: Some(dir),
        })
    }

    fn key_path(&self, alias: &str) -> Result<Option<PathBuf>, KeystoreError> {
        if alias.is_empty()
            || !alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(KeystoreError::InvalidKeyMaterial(format!(
                "alias {alias:?} contains unsupported characters"
            )));
        }
        Ok(self
            .dir
            .as_ref()
            .map(|dir| dir.join(format!("{alias}.{KEY_FILE_EXTENSION}"))))
    }

    fn read_key_file(path: &Path) -> Result<Option<StoredKey>, KeystoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeystoreError::Unavailable(e.to_string())),
        };
        let file: KeyFile = serde_json::from_slice(&bytes)
            .map_err(|e| KeystoreError::InvalidKeyMaterial(e.to_string()))?;
        let decode = |encoded: &str| {
            b64_decode(encoded).map_err(|e| KeystoreError::InvalidKeyMaterial(e.to_string()))
        };
        Ok(Some(StoredKey {
            key_type: file.key_type,
            private_key: Zeroizing::new(decode(&file.private_key)?),
            public_key: decode(&file.public_key)?,
        }))
    }

    fn write_key_file(path: &Path, key: &StoredKey) -> Result<(), KeystoreError> {
        let file = KeyFile {
            key_type: key.key_type,
            private_key: b64_encode(key.private_key.as_slice()),
            public_key: b64_encode(&key.public_key),
        };
        let bytes = Zeroizing::new(
            serde_json::to_vec(&file).map_err(|e| KeystoreError::Unavailable(e.to_string()))?,
        );
        write_atomic(path, &bytes).map_err(|e| KeystoreError::Unavailable(e.to_string()))
    }

    fn stored(&self, alias: String) -> Result<StoredKey, KeystoreError> {
        let cached = self
            .keys
            .read()
            .map_err(|_| Self::poisoned())?
            .get(&alias)
            .cloned();
        if let Some(stored) = cached {
            return Ok(stored);
        }

        let path = self
            .key_path(&alias)?
            .ok_or_else(|| KeystoreError::AliasNotFound(alias.clone()))?;
        let stored = Self::read_key_file(&path)?
            .ok_or_else(|| KeystoreError::AliasNotFound(alias.clone()))?;
        self.keys
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(alias, stored.clone());
        Ok(stored)
    }

    fn poisoned() -> KeystoreError {
        KeystoreError::Unavailable("keystore lock poisoned".to_string())
    }
}

impl Default for SoftwareKeystore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SecureKeystore for SoftwareKeystore {
    fn create_key_pair(&self, alias: String, spec: KeyGenSpec) -> Result<Vec<u8>, KeystoreError> {
        let path = self.key_path(&alias)?;
        let mut keys = self.keys.write().map_err(|_| Self::poisoned())?;
        if keys.contains_key(&alias) || path.as_deref().is_some_and(Path::exists) {
            return Err(KeystoreError::AliasExists(alias));
        }

        let generated = crypto::generate(&spec.parameters)
            .map_err(|e| KeystoreError::Generation(e.to_string()))?;
        let stored = StoredKey {
            key_type: spec.key_type,
            private_key: generated.private_pkcs8,
            public_key: generated.public_spki,
        };
        if let Some(path) = path {
            Self::write_key_file(&path, &stored)?;
        }

        let public_key = stored.public_key.clone();
        keys.insert(alias, stored);
        Ok(public_key)
    }

    fn public_key(&self, alias: String) -> Result<StoredPublicKey, KeystoreError> {
        let stored = self.stored(alias)?;
        Ok(StoredPublicKey {
            key_type: stored.key_type,
            public_key: stored.public_key,
        })
    }

    fn sign(&self, alias: String, data: Vec<u8>) -> Result<Vec<u8>, KeystoreError> {
        let stored = self.stored(alias)?;
        crypto::sign(stored.key_type, &stored.private_key, &data)
            .map_err(|e| KeystoreError::Signing(e.to_string()))
    }

    fn clear_all(&self) -> Result<(), KeystoreError> {
        self.keys.write().map_err(|_| Self::poisoned())?.clear();

        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let entries = fs::read_dir(dir).map_err(|e| KeystoreError::Unavailable(e.to_string()))?;
        for entry in entries {
            let path = entry
                .map_err(|e| KeystoreError::Unavailable(e.to_string()))?
                .path();
            if path.extension().is_some_and(|ext| ext == KEY_FILE_EXTENSION) {
                fs::remove_file(&path).map_err(|e| KeystoreError::Unavailable(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::JwsAlgorithm;

    #[test]
    fn test_create_then_sign() {
        let keystore = SoftwareKeystore::in_memory();
        let public_key = keystore
            .create_key_pair("alias-1".to_string(), KeyGenSpec::for_key_type(KeyType::Ec))
            .expect("create");

        let stored = keystore.public_key("alias-1".to_string()).expect("public key");
        assert_eq!(stored.key_type, KeyType::Ec);
        assert_eq!(stored.public_key, public_key);

        let signature = keystore
            .sign("alias-1".to_string(), b"payload".to_vec())
            .expect("sign");
        let jwk = crypto::public_jwk(KeyType::Ec, &public_key).expect("jwk");
        crypto::verify_signature(&jwk, JwsAlgorithm::ES256, b"payload", &signature)
            .expect("verify");
    }

    #[test]
    fn test_alias_cannot_be_reused() {
        let keystore = SoftwareKeystore::in_memory();
        let spec = KeyGenSpec::for_key_type(KeyType::Ec);
        keystore
            .create_key_pair("alias-1".to_string(), spec.clone())
            .expect("create");

        match keystore.create_key_pair("alias-1".to_string(), spec) {
            Err(KeystoreError::AliasExists(alias)) => assert_eq!(alias, "alias-1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_alias() {
        let keystore = SoftwareKeystore::in_memory();
        assert!(matches!(
            keystore.public_key("missing".to_string()),
            Err(KeystoreError::AliasNotFound(_))
        ));
        assert!(matches!(
            keystore.sign("missing".to_string(), vec![1]),
            Err(KeystoreError::AliasNotFound(_))
        ));
    }

    #[test]
    fn test_path_like_alias_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keystore = SoftwareKeystore::open(dir.path()).expect("open");
        assert!(matches!(
            keystore.create_key_pair("../escape".to_string(), KeyGenSpec::for_key_type(KeyType::Ec)),
            Err(KeystoreError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_persisted_keys_survive_reopen_and_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let public_key = {
            let keystore = SoftwareKeystore::open(dir.path()).expect("open");
            keystore
                .create_key_pair("alias-1".to_string(), KeyGenSpec::for_key_type(KeyType::Ec))
                .expect("create")
        };

        let reopened = SoftwareKeystore::open(dir.path()).expect("reopen");
        let stored = reopened.public_key("alias-1".to_string()).expect("load");
        assert_eq!(stored.public_key, public_key);

        reopened.clear_all().expect("clear");
        assert!(matches!(
            reopened.public_key("alias-1".to_string()),
            Err(KeystoreError::AliasNotFound(_))
        ));
        assert!(SoftwareKeystore::open(dir.path())
            .expect("reopen")
            .public_key("alias-1".to_string())
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let keystore = SoftwareKeystore::open(dir.path()).expect("open");
        keystore
            .create_key_pair("alias-1".to_string(), KeyGenSpec::for_key_type(KeyType::Ec))
            .expect("create");

        let path = dir.path().join(format!("alias-1.{KEY_FILE_EXTENSION}"));
        let mode = fs::metadata(path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
