#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Key custody and key attestation for an identity wallet.
//!
//! Two providers manage holder keys behind one contract:
//!
//! - [`LocalKeyProvider`] keeps key pairs in a device keystore ([`SecureKeystore`])
//!   and asks the wallet-provider service to attest the public key.
//! - [`RemoteKeyProvider`] lets the wallet-provider service generate and use the
//!   key; no private key material ever reaches the device.
//!
//! A [`CryptoProviderFactory`] picks the provider for a [`KeyType`], and the
//! [`signer`] module turns a provider key into the signer shapes needed by
//! JOSE (generic JWS, SD-JWT key binding, `OpenID4VCI` proof of possession) and
//! COSE (mdoc device authentication).
//!
//! [`KeyCustody`] builds the whole graph once at start-up.

mod custody;
pub use custody::KeyCustody;

mod config;
pub use config::WalletProviderConfig;

mod error;
pub use error::*;

mod types;
pub use types::*;

pub mod crypto;
pub mod jose;
pub mod keystore;
pub mod logger;
pub mod provider;
pub mod signer;
pub mod storage;
pub mod wallet_provider;

pub use keystore::{
    DeviceKey, KeyGenSpec, KeystoreError, SecureKeystore, SoftwareKeystore, StoredPublicKey,
};
pub use provider::{
    CleanupFailure, CleanupReport, CryptoProvider, CryptoProviderFactory, KeyPair,
    LocalKeyProvider, ProviderKind, ProviderOperation, RemoteKeyProvider,
};

// private modules
mod http_request;

uniffi::setup_scaffolding!("keycustody_core");
