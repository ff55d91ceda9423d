//! Identity Key Storage
//!
//! Persists the local user's asymmetric key pair in SQLite. Integers are stored
//! as base64 text; the table is created on connect.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::crypto::codec;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::keys::{AsymmetricKeyPair, AsymmetricPrivateKey, AsymmetricPublicKey};

/// Row id of the single local identity
const IDENTITY_ROW: &str = "identity";

/// Local store of the owning user's key pair
#[derive(Clone)]
pub struct IdentityKeyStore {
    db: SqlitePool,
}

impl IdentityKeyStore {
    /// Open (or create) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str) -> CryptoResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Identity key store opened at {}", url);
        Self::with_pool(db).await
    }

    /// Use an existing pool
    pub async fn with_pool(db: SqlitePool) -> CryptoResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identity_keys (
                id TEXT PRIMARY KEY,
                modulus TEXT NOT NULL,
                public_exponent TEXT NOT NULL,
                private_exponent TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db })
    }

    /// Save or replace the local identity
    pub async fn save_identity(&self, key_pair: &AsymmetricKeyPair) -> CryptoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_keys (id, modulus, public_exponent, private_exponent, created_at)
            VALUES ($1, $2, $3, $4, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                modulus = excluded.modulus,
                public_exponent = excluded.public_exponent,
                private_exponent = excluded.private_exponent,
                created_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(IDENTITY_ROW)
        .bind(codec::to_base64(&key_pair.modulus))
        .bind(codec::to_base64(&key_pair.public_exponent))
        .bind(codec::to_base64(key_pair.private_exponent()))
        .execute(&self.db)
        .await?;

        tracing::info!(
            fingerprint = %key_pair.public_key().fingerprint(),
            "Saved identity key pair"
        );
        Ok(())
    }

    /// Load the full key pair, if one was saved
    pub async fn load_keypair(&self) -> CryptoResult<Option<AsymmetricKeyPair>> {
        let result = sqlx::query(
            r#"SELECT modulus, public_exponent, private_exponent FROM identity_keys WHERE id = $1"#,
        )
        .bind(IDENTITY_ROW)
        .fetch_optional(&self.db)
        .await?;

        match result {
            Some(row) => {
                let modulus: String = row.get("modulus");
                let public_exponent: String = row.get("public_exponent");
                let private_exponent: String = row.get("private_exponent");

                let pair = AsymmetricKeyPair::from_parts(
                    decode_column(&modulus, "modulus")?,
                    decode_column(&public_exponent, "public_exponent")?,
                    decode_column(&private_exponent, "private_exponent")?,
                );
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }

    /// Load the public half
    pub async fn load_public_key(&self) -> CryptoResult<AsymmetricPublicKey> {
        self.load_keypair()
            .await?
            .map(|pair| pair.public_key())
            .ok_or(CryptoError::MissingLocalPublicKey)
    }

    /// Load the private half
    pub async fn load_private_key(&self) -> CryptoResult<AsymmetricPrivateKey> {
        self.load_keypair()
            .await?
            .map(|pair| pair.private_key())
            .ok_or(CryptoError::MissingLocalPrivateKey)
    }

    /// Delete the stored identity (for logout or re-provisioning)
    pub async fn delete_identity(&self) -> CryptoResult<()> {
        sqlx::query(r#"DELETE FROM identity_keys WHERE id = $1"#)
            .bind(IDENTITY_ROW)
            .execute(&self.db)
            .await?;

        tracing::info!("Deleted identity key pair");
        Ok(())
    }
}

fn decode_column(text: &str, column: &str) -> CryptoResult<num_bigint::BigUint> {
    codec::from_base64(text)
        .map_err(|e| CryptoError::InvalidKey(format!("Failed to decode {}: {}", column, e)))
}
