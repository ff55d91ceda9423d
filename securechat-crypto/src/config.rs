//! Crypto core configuration

use serde::{Deserialize, Serialize};

use crate::crypto::rsa::WrapEncoding;
use crate::error::{AppError, AppResult};

/// Tunables for key generation, key wrapping and message queueing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CryptoConfig {
    /// Bit length of each RSA prime (the modulus is twice this)
    pub prime_bits: u64,
    /// Miller-Rabin rounds per candidate
    pub miller_rabin_rounds: u32,
    /// Block layout used when wrapping session keys
    pub wrap_encoding: WrapEncoding,
    /// Messages held per unresolved session before new arrivals are dropped
    pub pending_queue_capacity: usize,
    /// Unresolved sessions allowed to hold queued messages at once
    pub max_pending_sessions: usize,
    /// Upper bound on prime candidates tried per key (None = unbounded)
    pub max_prime_candidates: Option<u64>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            prime_bits: 1024,
            miller_rabin_rounds: 40,
            wrap_encoding: WrapEncoding::Framed,
            pending_queue_capacity: 64,
            max_pending_sessions: 256,
            max_prime_candidates: None,
        }
    }
}

impl CryptoConfig {
    /// Parse from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working key
    pub fn validate(&self) -> AppResult<()> {
        // The modulus must hold a framed 44-byte exported key
        if self.prime_bits < 256 {
            return Err(AppError::Config(format!(
                "prime_bits must be at least 256, got {}",
                self.prime_bits
            )));
        }
        if self.miller_rabin_rounds == 0 {
            return Err(AppError::Config(
                "miller_rabin_rounds must be at least 1".to_string(),
            ));
        }
        if self.pending_queue_capacity == 0 {
            return Err(AppError::Config(
                "pending_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_pending_sessions == 0 {
            return Err(AppError::Config(
                "max_pending_sessions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
