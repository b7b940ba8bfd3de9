//! `keycustody`: drive the key custody core by hand against a wallet-provider.
//!
//! State lives under the data directory: the software keystore in `keys/`,
//! attestations in `attestations.json` and the wallet-instance credentials in
//! `credentials.json`.

mod offline;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use clap::{Args, Parser, Subcommand};
use eyre::{eyre, WrapErr};
use keycustody_core::crypto::verify_signature;
use keycustody_core::signer::{ProofClaims, ProofOfPossessionSigner};
use keycustody_core::storage::{FileAttestationTable, FileCredentialsStore};
use keycustody_core::wallet_provider::{
    DeviceInfo, HttpWalletProviderClient, WalletProviderClient,
};
use keycustody_core::{
    CleanupReport, KeyCustody, KeyType, SoftwareKeystore, WalletProviderConfig,
};
use offline::OfflineWalletProvider;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keycustody", version, about = "Key custody developer CLI")]
struct Cli {
    /// Base URL of the wallet-provider service.
    #[arg(long, env = "KEYCUSTODY_PROVIDER_URL", global = true)]
    provider_url: Option<String>,

    /// Directory holding keys, attestations and credentials.
    #[arg(long, env = "KEYCUSTODY_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 5, global = true)]
    timeout_secs: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register this instance with the wallet-provider (once).
    Register(RegisterArgs),
    /// Activate the registered instance.
    Activate {
        /// Activation token delivered out of band.
        token: String,
    },
    /// Generate a key with the provider selected for its type.
    Generate {
        /// Key type: `ec` or `rsa`.
        #[arg(long, default_value = "ec")]
        key_type: KeyType,
    },
    /// Print the stored attestation of a key.
    Attestation {
        /// Key identifier.
        key_id: String,
    },
    /// Sign a payload and verify the signature against the attested key.
    Sign(SignArgs),
    /// Build an `OpenID4VCI` proof JWT.
    Proof {
        /// Key identifier.
        key_id: String,
        /// Credential issuer identifier.
        #[arg(long)]
        audience: String,
        /// `c_nonce` from the issuer.
        #[arg(long)]
        nonce: Option<String>,
        /// Client identifier of the wallet.
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Delete all keys, attestations and credentials.
    Wipe,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long, default_value = std::env::consts::OS)]
    platform: String,
    #[arg(long, default_value = "unknown")]
    os_version: String,
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Payload {
    /// Hex-encoded payload.
    #[arg(long)]
    hex: Option<String>,
    /// UTF-8 payload.
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args)]
struct SignArgs {
    /// Key identifier.
    key_id: String,
    #[command(flatten)]
    payload: Payload,
}

impl Payload {
    fn bytes(&self) -> eyre::Result<Vec<u8>> {
        match (&self.hex, &self.text) {
            (Some(hex), _) => hex::decode(hex.trim_start_matches("0x")).wrap_err("invalid hex payload"),
            (None, Some(text)) => Ok(text.as_bytes().to_vec()),
            (None, None) => Err(eyre!("either --hex or --text is required")),
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(cli: &Cli) -> eyre::Result<PathBuf> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join("keycustody"))
            .ok_or_else(|| eyre!("cannot determine a data directory, pass --data-dir")),
    }
}

fn build_custody(cli: &Cli, dir: &Path) -> eyre::Result<KeyCustody> {
    let client: Arc<dyn WalletProviderClient> = match cli.provider_url.as_deref() {
        Some(url) => {
            let mut config = WalletProviderConfig::new(url);
            config.timeout_secs = cli.timeout_secs;
            Arc::new(HttpWalletProviderClient::new(&config)?)
        }
        None => Arc::new(OfflineWalletProvider),
    };

    let keystore = SoftwareKeystore::open(dir.join("keys")).wrap_err("opening keystore")?;
    let table = FileAttestationTable::open(dir.join("attestations.json"))
        .wrap_err("opening attestation table")?;
    let credentials = FileCredentialsStore::open(dir.join("credentials.json"))
        .wrap_err("opening credentials store")?;

    Ok(KeyCustody::new(
        Arc::new(keystore),
        Arc::new(table),
        Arc::new(credentials),
        client,
    ))
}

fn now() -> eyre::Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

async fn sign(custody: &KeyCustody, args: &SignArgs) -> eyre::Result<Value> {
    let data = args.payload.bytes()?;
    let provider = custody.provider_for_key(&args.key_id)?;
    let attestation = provider.get_key_attestation(&args.key_id).await?;
    let signature = provider.sign(&args.key_id, &data).await?;
    let verified = verify_signature(
        &attestation.public_jwk()?,
        attestation.algorithm(),
        &data,
        &signature,
    )
    .is_ok();
    Ok(json!({
        "key_id": args.key_id,
        "algorithm": attestation.algorithm(),
        "signature": URL_SAFE_NO_PAD.encode(&signature),
        "verified": verified,
    }))
}

fn wipe_output(reports: &[CleanupReport]) -> Value {
    let failures: Vec<Value> = reports
        .iter()
        .flat_map(|report| {
            report.failures.iter().map(move |failure| {
                json!({
                    "provider": report.provider.to_string(),
                    "step": failure.step,
                    "error": failure.error,
                })
            })
        })
        .collect();
    json!({ "wiped": true, "failures": failures })
}

async fn run(cli: Cli) -> eyre::Result<Value> {
    let dir = data_dir(&cli)?;
    let custody = build_custody(&cli, &dir)?;
    tracing::debug!("using data directory {}", dir.display());

    let output = match cli.command {
        Command::Register(args) => {
            let credentials = custody
                .register(&DeviceInfo {
                    platform: args.platform,
                    os_version: args.os_version,
                    app_version: args.app_version,
                    model: args.model,
                })
                .await?;
            json!({ "instance_id": credentials.instance_id })
        }
        Command::Activate { token } => {
            custody.activate(&token).await?;
            json!({ "activated": true })
        }
        Command::Generate { key_type } => {
            let provider = custody.provider_for_key_type(key_type).await?;
            let attestation = provider.generate_key(key_type).await?;
            json!({
                "key_id": attestation.key_id,
                "key_type": attestation.key_type,
                "provider": provider.kind().to_string(),
                "public_jwk": attestation.public_jwk()?,
            })
        }
        Command::Attestation { key_id } => {
            let attestation = custody.attestations().get(&key_id)?;
            json!({
                "key_id": attestation.key_id,
                "key_type": attestation.key_type,
                "algorithm": attestation.algorithm(),
                "public_jwk": attestation.public_jwk()?,
                "attestation": attestation.attestation,
            })
        }
        Command::Sign(args) => sign(&custody, &args).await?,
        Command::Proof {
            key_id,
            audience,
            nonce,
            client_id,
        } => {
            let provider = custody.provider_for_key(&key_id)?;
            let signer = ProofOfPossessionSigner::new(provider, &key_id).await?;
            let jwt = signer
                .proof_jwt(&ProofClaims {
                    iss: client_id,
                    aud: audience,
                    iat: now()?,
                    nonce,
                })
                .await?;
            json!({ "key_id": key_id, "proof": jwt })
        }
        Command::Wipe => wipe_output(&custody.wipe().await),
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
