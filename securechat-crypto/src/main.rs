//! securechat-keygen - Provision a local identity key pair
//!
//! Usage: `securechat-keygen [database-url] [config.json]`
//!
//! Generates a key pair on the blocking pool, stores it in the identity
//! database and logs the publication payload for the key directory.

use anyhow::Context;

use securechat_crypto::crypto::{IdentityKeyStore, KeyGenerator};
use securechat_crypto::{init_tracing, CryptoConfig};

const DEFAULT_DATABASE_URL: &str = "sqlite://securechat.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let database_url = args.next().unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let config = match args.next() {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            CryptoConfig::from_json(&json).context("Invalid crypto configuration")?
        }
        None => CryptoConfig::default(),
    };

    let store = IdentityKeyStore::connect(&database_url)
        .await
        .with_context(|| format!("Failed to open identity store at {}", database_url))?;

    if let Some(existing) = store.load_keypair().await? {
        tracing::warn!(
            fingerprint = %existing.public_key().fingerprint(),
            "Replacing existing identity key pair"
        );
    }

    tracing::info!(
        prime_bits = config.prime_bits,
        rounds = config.miller_rabin_rounds,
        "Generating identity key pair"
    );
    let key_pair = KeyGenerator::spawn(config)
        .join()
        .await
        .context("Key generation failed")?;

    store.save_identity(&key_pair).await?;

    let publication = key_pair.public_key().publication()?;
    tracing::info!("Identity publication: {}", serde_json::to_string(&publication)?);

    Ok(())
}
