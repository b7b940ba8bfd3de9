//! Common test doubles shared across integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keycustody_core::crypto::{self, GeneratedKey};
use keycustody_core::jose::{b64_encode, encode_segment, CompactJws, JwsAlgorithm, PublicJwk};
use keycustody_core::storage::{
    AttestationTable, CredentialsStore, KeyAttestationStore, MemoryAttestationTable,
    MemoryCredentialsStore, StorageError, StorageResult,
};
use keycustody_core::wallet_provider::{DeviceInfo, WalletProviderClient};
use keycustody_core::{
    CustodyError, CustodyResult, KeyAttestation, KeyCustody, KeyGenSpec, KeyType, KeystoreError,
    LocalKeyProvider, ProviderKind, RemoteKeyProvider, SecureKeystore, SoftwareKeystore,
    StoredPublicKey, WalletInstanceCredentials,
};
use serde_json::json;
use zeroize::Zeroizing;

pub const ISSUER: &str = "https://wallet-provider.example";

pub fn credentials() -> WalletInstanceCredentials {
    WalletInstanceCredentials {
        instance_id: "instance-1".to_string(),
        instance_secret: "instance-secret".to_string(),
    }
}

pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        platform: "android".to_string(),
        os_version: "15".to_string(),
        app_version: "1.0.0".to_string(),
        model: Some("Pixel".to_string()),
    }
}

fn generate(key_type: KeyType) -> CustodyResult<GeneratedKey> {
    crypto::generate(&KeyGenSpec::for_key_type(key_type).parameters)
}

/// In-process wallet-provider service.
///
/// Issues ES256 key attestations carrying the attested key in `cnf.jwk`, and
/// generates and signs with its own keys for the remote provider.
pub struct FakeWalletProvider {
    issuer: GeneratedKey,
    supported: HashSet<KeyType>,
    keys: Mutex<HashMap<String, (KeyType, Zeroizing<Vec<u8>>)>>,
    next_key: AtomicUsize,
    registrations: AtomicUsize,
    activations: Mutex<Vec<String>>,
    offline: AtomicBool,
    attest_foreign_keys: AtomicBool,
}

impl FakeWalletProvider {
    pub fn new(supported: &[KeyType]) -> Arc<Self> {
        Arc::new(Self {
            issuer: generate(KeyType::Ec).expect("issuer key"),
            supported: supported.iter().copied().collect(),
            keys: Mutex::new(HashMap::new()),
            next_key: AtomicUsize::new(1),
            registrations: AtomicUsize::new(0),
            activations: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            attest_foreign_keys: AtomicBool::new(false),
        })
    }

    pub fn issuer_jwk(&self) -> PublicJwk {
        crypto::public_jwk(KeyType::Ec, &self.issuer.public_spki).expect("issuer jwk")
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes `attest_key` attest a different key than the one presented.
    pub fn attest_foreign_keys(&self) {
        self.attest_foreign_keys.store(true, Ordering::SeqCst);
    }

    /// Drops a service-held key, as after a server-side reset.
    pub fn forget(&self, key_id: &str) {
        self.keys.lock().unwrap().remove(key_id);
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> Vec<String> {
        self.activations.lock().unwrap().clone()
    }

    /// Checks the issuer signature of an attestation.
    pub fn verify_attestation(&self, attestation: &str) -> CustodyResult<()> {
        let jws = CompactJws::parse(attestation)?;
        crypto::verify_signature(
            &self.issuer_jwk(),
            JwsAlgorithm::ES256,
            jws.signing_input(),
            &jws.signature,
        )
    }

    fn attestation(&self, key_id: &str, jwk: &PublicJwk) -> CustodyResult<String> {
        let header = json!({"alg": "ES256", "typ": "key-attestation+jwt"});
        let payload = json!({
            "iss": ISSUER,
            "sub": key_id,
            "iat": 1_700_000_000,
            "cnf": {"jwk": jwk},
        });
        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&payload)?);
        let signature = crypto::sign(
            KeyType::Ec,
            &self.issuer.private_pkcs8,
            signing_input.as_bytes(),
        )?;
        Ok(format!("{signing_input}.{}", b64_encode(signature)))
    }

    fn check(&self, credentials: Option<&WalletInstanceCredentials>) -> CustodyResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CustodyError::NetworkError {
                url: ISSUER.to_string(),
                status: None,
                error: "connection refused".to_string(),
            });
        }
        if credentials.is_some_and(|c| *c != self::credentials()) {
            return Err(CustodyError::NetworkError {
                url: ISSUER.to_string(),
                status: Some(401),
                error: "unknown wallet instance".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProviderClient for FakeWalletProvider {
    async fn register_instance(
        &self,
        _device_info: &DeviceInfo,
    ) -> CustodyResult<WalletInstanceCredentials> {
        self.check(None)?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(credentials())
    }

    async fn activate_instance(
        &self,
        token: &str,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<()> {
        self.check(Some(credentials))?;
        self.activations.lock().unwrap().push(token.to_string());
        Ok(())
    }

    async fn attest_key(
        &self,
        key_id: &str,
        key_type: KeyType,
        public_jwk: &PublicJwk,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<String> {
        self.check(Some(credentials))?;
        if self.attest_foreign_keys.load(Ordering::SeqCst) {
            let other = generate(key_type)?;
            let other_jwk = crypto::public_jwk(key_type, &other.public_spki)?;
            return self.attestation(key_id, &other_jwk);
        }
        self.attestation(key_id, public_jwk)
    }

    async fn generate_key(
        &self,
        key_type: KeyType,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<KeyAttestation> {
        self.check(Some(credentials))?;
        let key = generate(key_type)?;
        let jwk = crypto::public_jwk(key_type, &key.public_spki)?;
        let key_id = format!("remote-{}", self.next_key.fetch_add(1, Ordering::SeqCst));
        let attestation = self.attestation(&key_id, &jwk)?;
        self.keys
            .lock()
            .unwrap()
            .insert(key_id.clone(), (key_type, key.private_pkcs8));
        Ok(KeyAttestation {
            key_id,
            attestation,
            key_type,
            provider: ProviderKind::Remote,
        })
    }

    async fn sign(
        &self,
        attestation: &KeyAttestation,
        data: &[u8],
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<Vec<u8>> {
        self.check(Some(credentials))?;
        let keys = self.keys.lock().unwrap();
        let (key_type, private_key) =
            keys.get(&attestation.key_id)
                .ok_or_else(|| CustodyError::AttestationNotFound {
                    key_id: attestation.key_id.clone(),
                })?;
        crypto::sign(*key_type, private_key, data)
    }

    async fn supports_key(&self, key_type: KeyType) -> CustodyResult<bool> {
        self.check(None)?;
        Ok(self.supported.contains(&key_type))
    }
}

/// Keystore whose every operation fails.
pub struct FailingKeystore;

impl SecureKeystore for FailingKeystore {
    fn create_key_pair(&self, _alias: String, _spec: KeyGenSpec) -> Result<Vec<u8>, KeystoreError> {
        Err(KeystoreError::Unavailable("keystore locked".to_string()))
    }

    fn public_key(&self, _alias: String) -> Result<StoredPublicKey, KeystoreError> {
        Err(KeystoreError::Unavailable("keystore locked".to_string()))
    }

    fn sign(&self, _alias: String, _data: Vec<u8>) -> Result<Vec<u8>, KeystoreError> {
        Err(KeystoreError::Unavailable("keystore locked".to_string()))
    }

    fn clear_all(&self) -> Result<(), KeystoreError> {
        Err(KeystoreError::Unavailable("keystore locked".to_string()))
    }
}

/// Software keystore whose `sign` waits until another task opens the gate.
pub struct GatedKeystore {
    inner: SoftwareKeystore,
    gate: Mutex<Receiver<()>>,
}

impl GatedKeystore {
    pub fn new() -> (Arc<Self>, Sender<()>) {
        let (open, gate) = mpsc::channel();
        let keystore = Arc::new(Self {
            inner: SoftwareKeystore::in_memory(),
            gate: Mutex::new(gate),
        });
        (keystore, open)
    }
}

impl SecureKeystore for GatedKeystore {
    fn create_key_pair(&self, alias: String, spec: KeyGenSpec) -> Result<Vec<u8>, KeystoreError> {
        self.inner.create_key_pair(alias, spec)
    }

    fn public_key(&self, alias: String) -> Result<StoredPublicKey, KeystoreError> {
        self.inner.public_key(alias)
    }

    fn sign(&self, alias: String, data: Vec<u8>) -> Result<Vec<u8>, KeystoreError> {
        self.gate
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10))
            .map_err(|_| KeystoreError::Unavailable("gate never opened".to_string()))?;
        self.inner.sign(alias, data)
    }

    fn clear_all(&self) -> Result<(), KeystoreError> {
        self.inner.clear_all()
    }
}

/// Attestation table whose every operation fails.
pub struct FailingTable;

impl AttestationTable for FailingTable {
    fn insert(&self, _attestation: &KeyAttestation) -> StorageResult<()> {
        Err(StorageError::Io("disk full".to_string()))
    }

    fn get(&self, _key_id: &str) -> StorageResult<Option<KeyAttestation>> {
        Err(StorageError::Io("disk full".to_string()))
    }

    fn delete(&self, _key_id: &str) -> StorageResult<bool> {
        Err(StorageError::Io("disk full".to_string()))
    }

    fn delete_all(&self) -> StorageResult<()> {
        Err(StorageError::Io("disk full".to_string()))
    }
}

/// Credentials store whose every operation fails.
pub struct FailingCredentials;

impl CredentialsStore for FailingCredentials {
    fn get(&self) -> StorageResult<Option<WalletInstanceCredentials>> {
        Err(StorageError::Io("disk full".to_string()))
    }

    fn set(&self, _credentials: &WalletInstanceCredentials) -> StorageResult<()> {
        Err(StorageError::Io("disk full".to_string()))
    }

    fn clear(&self) -> StorageResult<()> {
        Err(StorageError::Io("disk full".to_string()))
    }
}

/// Collaborators of a provider under test, with handles for inspection.
pub struct Harness {
    pub service: Arc<FakeWalletProvider>,
    pub keystore: Arc<dyn SecureKeystore>,
    pub table: Arc<MemoryAttestationTable>,
    pub credentials: Arc<MemoryCredentialsStore>,
}

impl Harness {
    /// A registered wallet instance talking to a service supporting `supported`.
    pub fn registered(supported: &[KeyType]) -> Self {
        Self {
            service: FakeWalletProvider::new(supported),
            keystore: Arc::new(SoftwareKeystore::in_memory()),
            table: Arc::new(MemoryAttestationTable::new()),
            credentials: Arc::new(MemoryCredentialsStore::with_credentials(credentials())),
        }
    }

    pub fn unregistered(supported: &[KeyType]) -> Self {
        Self {
            credentials: Arc::new(MemoryCredentialsStore::new()),
            ..Self::registered(supported)
        }
    }

    pub fn with_keystore(mut self, keystore: Arc<dyn SecureKeystore>) -> Self {
        self.keystore = keystore;
        self
    }

    pub fn store(&self) -> KeyAttestationStore {
        KeyAttestationStore::new(self.table.clone())
    }

    pub fn local(&self) -> LocalKeyProvider {
        LocalKeyProvider::new(
            Arc::clone(&self.keystore),
            self.store(),
            self.credentials.clone(),
            self.service.clone(),
        )
    }

    pub fn remote(&self) -> RemoteKeyProvider {
        RemoteKeyProvider::new(self.store(), self.credentials.clone(), self.service.clone())
    }

    pub fn custody(&self) -> KeyCustody {
        KeyCustody::new(
            Arc::clone(&self.keystore),
            self.table.clone(),
            self.credentials.clone(),
            self.service.clone(),
        )
    }
}
