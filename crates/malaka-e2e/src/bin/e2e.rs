//! malaka-e2e: Command-line tool for chat end-to-end encryption.
//!
//! Manages per-user P-256 identities in the configured key store and
//! encrypts or decrypts single messages against a peer's public JWK.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use malaka_e2e::logging::{init_tracing, LogFormat};
use malaka_e2e::{
    compute_fingerprint, import_public, E2eClient, E2eConfig, E2eError, EcJwk, EncryptedPayload,
    KeyStore, PublicKeyMaterial, SoftwareProvider,
};

type Client = E2eClient<Arc<dyn KeyStore>, SoftwareProvider>;

#[derive(Parser)]
#[command(name = "malaka-e2e")]
#[command(author, version, about = "End-to-end encryption for Malaka chat")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the user's key pair, or reuse the existing one
    Keygen {
        /// User identifier
        #[arg(short, long)]
        user: String,

        /// Device label for the directory upload (default: from config)
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Replace the user's key pair with a new generation
    Rotate {
        /// User identifier
        #[arg(short, long)]
        user: String,
    },

    /// Show the user's current public key and fingerprint
    Show {
        /// User identifier
        #[arg(short, long)]
        user: String,
    },

    /// Compute the fingerprint of a JWK file
    Fingerprint {
        /// Path to a JWK file
        #[arg(short, long)]
        jwk: PathBuf,
    },

    /// Encrypt a message for a peer
    Encrypt {
        /// Sending user
        #[arg(short, long)]
        user: String,

        /// Path to the peer's public JWK
        #[arg(short, long)]
        peer: PathBuf,

        /// Message text
        #[arg(short, long)]
        message: String,
    },

    /// Decrypt a message exchanged with a peer
    Decrypt {
        /// Receiving (or original sending) user
        #[arg(short, long)]
        user: String,

        /// Path to the peer's public JWK
        #[arg(short, long)]
        peer: PathBuf,

        /// Base64 ciphertext
        #[arg(short, long)]
        content: String,

        /// Base64 nonce
        #[arg(short, long)]
        nonce: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = E2eConfig::load().context("loading configuration")?;
    let store = config
        .store
        .open()
        .await
        .with_context(|| format!("opening {} key store", config.store.backend))?;
    let client: Client = E2eClient::new(store, Arc::new(SoftwareProvider::new()));

    match cli.command {
        Commands::Keygen { user, label } => {
            let label = label.unwrap_or_else(|| config.device_label.clone());
            cmd_keygen(&client, &user, &label).await?;
        }
        Commands::Rotate { user } => {
            cmd_rotate(&client, &user).await?;
        }
        Commands::Show { user } => {
            cmd_show(&client, &user).await?;
        }
        Commands::Fingerprint { jwk } => {
            cmd_fingerprint(&jwk)?;
        }
        Commands::Encrypt {
            user,
            peer,
            message,
        } => {
            cmd_encrypt(&client, &user, &peer, &message).await?;
        }
        Commands::Decrypt {
            user,
            peer,
            content,
            nonce,
        } => {
            cmd_decrypt(&client, &user, &peer, content, nonce).await?;
        }
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_jwk(path: &Path) -> anyhow::Result<EcJwk> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading JWK {}", path.display()))?;
    Ok(EcJwk::from_json(&text)?)
}

/// Peer keys may be handed over as full private JWKs by mistake; only the
/// public half is ever used.
fn read_peer(path: &Path) -> anyhow::Result<PublicKeyMaterial> {
    let jwk = read_jwk(path)?;
    Ok(if jwk.is_private() { jwk.to_public() } else { jwk })
}

async fn cmd_keygen(client: &Client, user: &str, label: &str) -> anyhow::Result<()> {
    let record = client.ensure_identity(user).await?;
    let upload = client.public_key_upload(user, Some(label)).await?;

    print_json(&serde_json::json!({
        "user_id": record.user_id,
        "generation": record.generation,
        "created_at": record.created_at,
        "upload": upload,
    }))
}

async fn cmd_rotate(client: &Client, user: &str) -> anyhow::Result<()> {
    let record = client.rotate_identity(user).await?;

    print_json(&serde_json::json!({
        "user_id": record.user_id,
        "generation": record.generation,
        "fingerprint": record.fingerprint,
        "public_key_jwk": record.public_key,
    }))
}

async fn cmd_show(client: &Client, user: &str) -> anyhow::Result<()> {
    let history = client.storage().history(user).await?;
    let record = history
        .last()
        .ok_or_else(|| E2eError::KeyNotFound(user.to_string()))?;

    print_json(&serde_json::json!({
        "user_id": record.user_id,
        "store_backend": client.storage().store_backend().backend_name(),
        "generation": record.generation,
        "generations": history.len(),
        "fingerprint": record.fingerprint,
        "created_at": record.created_at,
        "public_key_jwk": record.public_key,
    }))
}

fn cmd_fingerprint(path: &Path) -> anyhow::Result<()> {
    let jwk = read_jwk(path)?;
    let public = import_public(&jwk.to_public())?;

    print_json(&serde_json::json!({
        "file": path.to_string_lossy(),
        "private": jwk.is_private(),
        "fingerprint": compute_fingerprint(&public),
    }))
}

async fn cmd_encrypt(
    client: &Client,
    user: &str,
    peer_path: &Path,
    message: &str,
) -> anyhow::Result<()> {
    let peer = read_peer(peer_path)?;
    let payload = client.encrypt_for(user, message, &peer).await?;

    print_json(&serde_json::to_value(&payload)?)
}

async fn cmd_decrypt(
    client: &Client,
    user: &str,
    peer_path: &Path,
    encrypted_content: String,
    nonce: String,
) -> anyhow::Result<()> {
    let peer = read_peer(peer_path)?;
    let payload = EncryptedPayload {
        encrypted_content,
        nonce,
    };
    let plaintext = client.decrypt_from(user, &payload, &peer).await?;

    print_json(&serde_json::json!({
        "user_id": user,
        "plaintext": plaintext,
    }))
}
