//! Identity key types and generation
//!
//! Each user identity owns one RSA-style key pair built from two random
//! probable primes:
//! - The public half (modulus + fixed exponent 65537) is published so peers can
//!   wrap conversation keys for this identity
//! - The private half (modulus + private exponent) never leaves the device
//!
//! Prime search is the heaviest operation in the system, so [`KeyGenerator`]
//! runs it on the blocking thread pool and hands the finished pair back over a
//! oneshot channel.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use num_bigint::BigUint;
use num_traits::One;
use tokio::sync::oneshot;

use crate::config::CryptoConfig;
use crate::crypto::arith::{gcd, lcm, mod_inverse};
use crate::crypto::codec;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::primality::{has_small_factor, is_probable_prime, random_odd_candidate};
use crate::models::IdentityPublication;

/// Fixed public exponent
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Public half of an identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricPublicKey {
    pub modulus: BigUint,
    pub public_exponent: BigUint,
}

impl AsymmetricPublicKey {
    /// Rebuild from a published modulus; the exponent is always 65537
    pub fn from_base64(modulus_b64: &str) -> CryptoResult<Self> {
        let modulus = codec::from_base64(modulus_b64)?;
        if modulus.bits() < 64 {
            return Err(CryptoError::InvalidKey(format!(
                "modulus too small: {} bits",
                modulus.bits()
            )));
        }
        Ok(Self {
            modulus,
            public_exponent: BigUint::from(PUBLIC_EXPONENT),
        })
    }

    /// Fixed-width base64 of the modulus
    pub fn modulus_base64(&self) -> CryptoResult<String> {
        codec::to_base64_fixed(&self.modulus, self.byte_width())
    }

    /// Shape published to the key directory
    pub fn publication(&self) -> CryptoResult<IdentityPublication> {
        Ok(IdentityPublication {
            public_key: self.modulus_base64()?,
            exponent: PUBLIC_EXPONENT,
        })
    }

    /// Bytes needed for any value below the modulus
    pub fn byte_width(&self) -> usize {
        codec::byte_width(&self.modulus)
    }

    /// Compute a fingerprint for key verification
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let bytes = codec::to_fixed_bytes(&self.modulus, self.byte_width())
            .unwrap_or_else(|_| self.modulus.to_bytes_be());
        let hash = Sha256::digest(&bytes);
        hex::encode(&hash[..8])
    }
}

/// Private half of an identity key
#[derive(Clone)]
pub struct AsymmetricPrivateKey {
    pub modulus: BigUint,
    private_exponent: BigUint,
}

impl AsymmetricPrivateKey {
    /// Restore from stored components
    pub fn new(modulus: BigUint, private_exponent: BigUint) -> Self {
        Self {
            modulus,
            private_exponent,
        }
    }

    /// The private exponent d
    pub fn private_exponent(&self) -> &BigUint {
        &self.private_exponent
    }
}

impl fmt::Debug for AsymmetricPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricPrivateKey")
            .field("modulus_bits", &self.modulus.bits())
            .field("private_exponent", &"<redacted>")
            .finish()
    }
}

/// Full identity key pair
#[derive(Clone)]
pub struct AsymmetricKeyPair {
    pub modulus: BigUint,
    pub public_exponent: BigUint,
    private_exponent: BigUint,
}

impl AsymmetricKeyPair {
    /// Restore from stored components
    pub fn from_parts(modulus: BigUint, public_exponent: BigUint, private_exponent: BigUint) -> Self {
        Self {
            modulus,
            public_exponent,
            private_exponent,
        }
    }

    /// Generate a new key pair synchronously
    ///
    /// Blocks the calling thread for the whole prime search; async callers
    /// should use [`KeyGenerator::spawn`] instead.
    pub fn generate(config: &CryptoConfig) -> CryptoResult<Self> {
        generate_with_cancel(config, &AtomicBool::new(false))
    }

    /// Public projection
    pub fn public_key(&self) -> AsymmetricPublicKey {
        AsymmetricPublicKey {
            modulus: self.modulus.clone(),
            public_exponent: self.public_exponent.clone(),
        }
    }

    /// Private projection
    pub fn private_key(&self) -> AsymmetricPrivateKey {
        AsymmetricPrivateKey::new(self.modulus.clone(), self.private_exponent.clone())
    }

    /// The private exponent d
    pub fn private_exponent(&self) -> &BigUint {
        &self.private_exponent
    }
}

impl fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("modulus_bits", &self.modulus.bits())
            .field("public_exponent", &self.public_exponent)
            .field("private_exponent", &"<redacted>")
            .finish()
    }
}

fn generate_with_cancel(config: &CryptoConfig, cancel: &AtomicBool) -> CryptoResult<AsymmetricKeyPair> {
    config
        .validate()
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

    let started = Instant::now();
    let e = BigUint::from(PUBLIC_EXPONENT);
    let mut resamples = 0u32;

    loop {
        let p = find_prime(config, cancel)?;
        let mut q = find_prime(config, cancel)?;
        while q == p {
            q = find_prime(config, cancel)?;
        }

        match assemble(&p, &q, &e) {
            Ok(pair) => {
                tracing::info!(
                    modulus_bits = pair.modulus.bits(),
                    resamples,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generated identity key pair"
                );
                return Ok(pair);
            }
            Err(CryptoError::NonCoprimeExponent) => {
                resamples += 1;
                tracing::debug!("Public exponent not coprime with phi, resampling primes");
            }
            Err(other) => return Err(other),
        }
    }
}

/// Build n, phi and d from two distinct primes
fn assemble(p: &BigUint, q: &BigUint, e: &BigUint) -> CryptoResult<AsymmetricKeyPair> {
    let one = BigUint::one();
    let modulus = p * q;
    let phi = lcm(&(p - &one), &(q - &one));

    if !gcd(e, &phi).is_one() {
        return Err(CryptoError::NonCoprimeExponent);
    }
    let d = mod_inverse(e, &phi).ok_or(CryptoError::NonCoprimeExponent)?;

    Ok(AsymmetricKeyPair {
        modulus,
        public_exponent: e.clone(),
        private_exponent: d,
    })
}

fn find_prime(config: &CryptoConfig, cancel: &AtomicBool) -> CryptoResult<BigUint> {
    let mut tried = 0u64;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(CryptoError::KeyGenerationCancelled);
        }
        if let Some(limit) = config.max_prime_candidates {
            if tried >= limit {
                return Err(CryptoError::KeyGenerationFailed(format!(
                    "no {}-bit prime found in {} candidates",
                    config.prime_bits, limit
                )));
            }
        }
        tried += 1;

        let candidate = random_odd_candidate(config.prime_bits);
        if has_small_factor(&candidate) {
            continue;
        }
        if is_probable_prime(&candidate, config.miller_rabin_rounds) {
            tracing::debug!(candidates = tried, bits = config.prime_bits, "Found probable prime");
            return Ok(candidate);
        }
    }
}

/// Runs key generation off the async executor
pub struct KeyGenerator;

impl KeyGenerator {
    /// Start a prime search on the blocking pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: CryptoConfig) -> KeyGenHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let worker_cancel = Arc::clone(&cancel);
        tokio::task::spawn_blocking(move || {
            let result = generate_with_cancel(&config, &worker_cancel);
            if tx.send(result).is_err() {
                tracing::debug!("Key generation finished after its handle was dropped");
            }
        });

        KeyGenHandle { rx, cancel }
    }
}

/// Pending key generation
///
/// Dropping the handle cancels the search.
pub struct KeyGenHandle {
    rx: oneshot::Receiver<CryptoResult<AsymmetricKeyPair>>,
    cancel: Arc<AtomicBool>,
}

impl KeyGenHandle {
    /// Ask the worker to stop at the next candidate
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the generated key pair
    pub async fn join(mut self) -> CryptoResult<AsymmetricKeyPair> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(CryptoError::KeyGenerationFailed(
                "key generation worker exited".to_string(),
            )),
        }
    }
}

impl Drop for KeyGenHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::arith::mod_pow;

    fn test_config() -> CryptoConfig {
        CryptoConfig {
            prime_bits: 256,
            ..Default::default()
        }
    }

    #[test]
    fn test_key_pair_generation() {
        let pair = AsymmetricKeyPair::generate(&test_config()).unwrap();
        assert_eq!(pair.modulus.bits(), 512);
        assert_eq!(pair.public_exponent, BigUint::from(PUBLIC_EXPONENT));

        // e*d == 1 (mod phi) implies the textbook identity for any m < n
        let m = BigUint::from(0xC0FFEEu32);
        let c = mod_pow(&m, &pair.public_exponent, &pair.modulus).unwrap();
        assert_eq!(mod_pow(&c, pair.private_exponent(), &pair.modulus).unwrap(), m);
    }

    #[test]
    fn test_assemble_rejects_non_coprime_exponent() {
        // p - 1 = 2 * 3, so e = 3 shares a factor with phi
        let p = BigUint::from(7u32);
        let q = BigUint::from(11u32);
        assert!(matches!(
            assemble(&p, &q, &BigUint::from(3u32)),
            Err(CryptoError::NonCoprimeExponent)
        ));

        let pair = assemble(&p, &q, &BigUint::from(7u32)).unwrap();
        // phi = lcm(6, 10) = 30 and 7 * 13 = 91 = 1 (mod 30)
        assert_eq!(pair.private_exponent, BigUint::from(13u32));
    }

    #[test]
    fn test_candidate_limit() {
        let config = CryptoConfig {
            prime_bits: 256,
            max_prime_candidates: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            AsymmetricKeyPair::generate(&config),
            Err(CryptoError::KeyGenerationFailed(_))
        ));
    }

    #[test]
    fn test_generate_rejects_invalid_config() {
        let no_rounds = CryptoConfig {
            prime_bits: 256,
            miller_rabin_rounds: 0,
            ..Default::default()
        };
        assert!(matches!(
            AsymmetricKeyPair::generate(&no_rounds),
            Err(CryptoError::KeyGenerationFailed(msg)) if msg.contains("miller_rabin_rounds")
        ));

        let no_bits = CryptoConfig {
            prime_bits: 0,
            ..Default::default()
        };
        assert!(matches!(
            AsymmetricKeyPair::generate(&no_bits),
            Err(CryptoError::KeyGenerationFailed(msg)) if msg.contains("prime_bits")
        ));
    }

    #[tokio::test]
    async fn test_background_generation_rejects_invalid_config() {
        let config = CryptoConfig {
            miller_rabin_rounds: 0,
            ..Default::default()
        };
        assert!(matches!(
            KeyGenerator::spawn(config).join().await,
            Err(CryptoError::KeyGenerationFailed(_))
        ));
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let pair = AsymmetricKeyPair::generate(&test_config()).unwrap();
        let public = pair.public_key();

        let encoded = public.modulus_base64().unwrap();
        let restored = AsymmetricPublicKey::from_base64(&encoded).unwrap();
        assert_eq!(restored, public);

        let publication = public.publication().unwrap();
        assert_eq!(publication.exponent, 65537);
        assert_eq!(publication.public_key, encoded);
    }

    #[test]
    fn test_fingerprint() {
        let pair = AsymmetricKeyPair::generate(&test_config()).unwrap();
        let fingerprint = pair.public_key().fingerprint();
        assert_eq!(fingerprint.len(), 16); // 8 bytes as hex = 16 chars
    }

    #[test]
    fn test_private_key_debug_redacted() {
        let pair = AsymmetricKeyPair::generate(&test_config()).unwrap();
        let debug = format!("{:?} {:?}", pair, pair.private_key());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&pair.private_exponent().to_string()));
    }

    #[tokio::test]
    async fn test_background_generation() {
        let handle = KeyGenerator::spawn(test_config());
        let pair = handle.join().await.unwrap();
        assert_eq!(pair.modulus.bits(), 512);
    }

    #[tokio::test]
    async fn test_background_generation_cancelled() {
        let config = CryptoConfig {
            prime_bits: 4096,
            ..Default::default()
        };
        let handle = KeyGenerator::spawn(config);
        handle.cancel();
        assert!(matches!(
            handle.join().await,
            Err(CryptoError::KeyGenerationCancelled)
        ));
    }
}
