//! Conversation keys and AES-256-GCM message encryption
//!
//! Every conversation has one 256-bit key. Each call to [`encrypt`] draws a
//! fresh 96-bit nonce from the OS CSPRNG; the 128-bit tag is appended to the
//! ciphertext and no associated data is used.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::errors::{CryptoError, CryptoResult};

/// Key size (256 bits)
pub const KEY_SIZE: usize = 32;

/// Nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Conversation key with automatic zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Serialize the raw key material as base64 for wrapping
    pub fn export(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Rebuild a key from exported material
    pub fn import(exported: &str) -> CryptoResult<Self> {
        let mut bytes = STANDARD.decode(exported.trim())?;
        let result = <[u8; KEY_SIZE]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| {
                CryptoError::InvalidKey(format!(
                    "Symmetric key must be {} bytes, got {}",
                    KEY_SIZE,
                    bytes.len()
                ))
            });
        bytes.zeroize();
        result
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new((&self.0).into())
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Output of one encryption call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Ciphertext with the authentication tag appended
    pub ciphertext: Vec<u8>,
    /// Nonce used for this ciphertext
    pub nonce: [u8; NONCE_SIZE],
}

impl EncryptedEnvelope {
    /// Base64 of the ciphertext
    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    /// Base64 of the nonce
    pub fn nonce_base64(&self) -> String {
        STANDARD.encode(self.nonce)
    }
}

/// Encrypt UTF-8 text under a conversation key
pub fn encrypt(plaintext: &str, key: &SymmetricKey) -> CryptoResult<EncryptedEnvelope> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionError(format!("AES-GCM: {}", e)))?;

    Ok(EncryptedEnvelope { ciphertext, nonce })
}

/// Decrypt and authenticate a ciphertext
///
/// Any tag mismatch, including one caused by the wrong key or nonce, is an
/// [`CryptoError::AuthenticationFailure`].
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, nonce: &[u8]) -> CryptoResult<String> {
    if nonce.len() != NONCE_SIZE || ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }

    let plaintext = key.cipher().decrypt(Nonce::from_slice(nonce), ciphertext)?;
    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SymmetricKey::generate();
        let envelope = encrypt("hello", &key).unwrap();

        assert_eq!(envelope.ciphertext.len(), "hello".len() + TAG_SIZE);
        assert_eq!(decrypt(&envelope.ciphertext, &key, &envelope.nonce).unwrap(), "hello");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = SymmetricKey::generate();
        let a = encrypt("same text", &key).unwrap();
        let b = encrypt("same text", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_export_import() {
        let key = SymmetricKey::generate();
        let exported = key.export();
        assert_eq!(exported.len(), 44);

        let imported = SymmetricKey::import(&exported).unwrap();
        assert_eq!(imported, key);

        // Imported key decrypts what the exported one encrypted
        let envelope = encrypt("round trip", &key).unwrap();
        assert_eq!(
            decrypt(&envelope.ciphertext, &imported, &envelope.nonce).unwrap(),
            "round trip"
        );
    }

    #[test]
    fn test_import_rejects_wrong_length() {
        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(SymmetricKey::import(&short), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(SymmetricKey::import("%%%"), Err(CryptoError::InvalidEncoding(_))));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let envelope = encrypt("secret", &SymmetricKey::generate()).unwrap();
        let result = decrypt(&envelope.ciphertext, &SymmetricKey::generate(), &envelope.nonce);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailure)));
    }

    #[test]
    fn test_malformed_nonce_fails_authentication() {
        let key = SymmetricKey::generate();
        let envelope = encrypt("secret", &key).unwrap();
        assert!(matches!(
            decrypt(&envelope.ciphertext, &key, &envelope.nonce[..8]),
            Err(CryptoError::AuthenticationFailure)
        ));
        assert!(matches!(
            decrypt(&[0u8; 4], &key, &envelope.nonce),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_debug_redacted() {
        assert_eq!(format!("{:?}", SymmetricKey::generate()), "SymmetricKey(<redacted>)");
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in ".*") {
            let key = SymmetricKey::generate();
            let envelope = encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(decrypt(&envelope.ciphertext, &key, &envelope.nonce).unwrap(), plaintext);
        }

        #[test]
        fn prop_bit_flip_in_ciphertext_rejected(plaintext in ".{0,64}", bit in any::<usize>()) {
            let key = SymmetricKey::generate();
            let mut envelope = encrypt(&plaintext, &key).unwrap();
            let bit = bit % (envelope.ciphertext.len() * 8);
            envelope.ciphertext[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(matches!(
                decrypt(&envelope.ciphertext, &key, &envelope.nonce),
                Err(CryptoError::AuthenticationFailure)
            ));
        }

        #[test]
        fn prop_bit_flip_in_nonce_rejected(plaintext in ".{0,64}", bit in 0usize..(NONCE_SIZE * 8)) {
            let key = SymmetricKey::generate();
            let mut envelope = encrypt(&plaintext, &key).unwrap();
            envelope.nonce[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(matches!(
                decrypt(&envelope.ciphertext, &key, &envelope.nonce),
                Err(CryptoError::AuthenticationFailure)
            ));
        }
    }
}
