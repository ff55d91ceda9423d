//! Single-block asymmetric encryption with identity keys
//!
//! Only used to wrap small fixed-size payloads (exported conversation keys);
//! the modulus bounds the payload length so arbitrary message text never goes
//! through here.
//!
//! ## Block layouts
//!
//! - [`WrapEncoding::Framed`]: `0x01 || len (u16 BE) || payload`. The marker
//!   byte keeps the integer's leading bytes intact, so decryption returns
//!   exactly the input, including leading zero or control bytes.
//! - [`WrapEncoding::Legacy`]: payload interpreted directly as an integer; on
//!   decryption a single leading byte <= 31 is stripped. Kept only to read keys
//!   wrapped by older clients.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::crypto::arith::mod_pow;
use crate::crypto::codec;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::keys::{AsymmetricPrivateKey, AsymmetricPublicKey};

const FRAME_MARKER: u8 = 0x01;
const FRAME_HEADER_LEN: usize = 3;

/// How a payload is laid out inside the RSA block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WrapEncoding {
    /// Marker + length prefix, exact round trip
    #[default]
    Framed,
    /// Unpadded integer with leading-control-byte stripping
    Legacy,
}

/// Largest payload that fits under `public_key` with the framed layout
///
/// One byte is kept free so the block is always below the modulus.
pub fn max_framed_payload(public_key: &AsymmetricPublicKey) -> usize {
    public_key
        .byte_width()
        .saturating_sub(FRAME_HEADER_LEN + 1)
        .min(u16::MAX as usize)
}

/// c = m^e mod n
pub fn encrypt_int(m: &BigUint, public_key: &AsymmetricPublicKey) -> CryptoResult<BigUint> {
    if *m >= public_key.modulus {
        return Err(CryptoError::MessageTooLargeForModulus {
            message_bits: m.bits(),
            modulus_bits: public_key.modulus.bits(),
        });
    }
    mod_pow(m, &public_key.public_exponent, &public_key.modulus)
}

/// m = c^d mod n
pub fn decrypt_int(c: &BigUint, private_key: &AsymmetricPrivateKey) -> CryptoResult<BigUint> {
    mod_pow(c, private_key.private_exponent(), &private_key.modulus)
}

/// Encrypt a short byte string under a public key
pub fn encrypt(
    message: &[u8],
    public_key: &AsymmetricPublicKey,
    encoding: WrapEncoding,
) -> CryptoResult<BigUint> {
    let block = match encoding {
        WrapEncoding::Framed => frame(message, public_key)?,
        WrapEncoding::Legacy => message.to_vec(),
    };

    encrypt_int(&codec::from_bytes_be(&block), public_key)
}

/// Decrypt a block produced by [`encrypt`] with the same encoding
pub fn decrypt(
    ciphertext: &BigUint,
    private_key: &AsymmetricPrivateKey,
    encoding: WrapEncoding,
) -> CryptoResult<Vec<u8>> {
    let m = decrypt_int(ciphertext, private_key)?;

    match encoding {
        WrapEncoding::Framed => unframe(&codec::to_bytes_be(&m)),
        WrapEncoding::Legacy => Ok(strip_legacy(&m)),
    }
}

fn frame(message: &[u8], public_key: &AsymmetricPublicKey) -> CryptoResult<Vec<u8>> {
    if message.len() > max_framed_payload(public_key) {
        return Err(CryptoError::MessageTooLargeForModulus {
            message_bits: ((message.len() + FRAME_HEADER_LEN) * 8) as u64,
            modulus_bits: public_key.modulus.bits(),
        });
    }

    let len = message.len() as u16;
    let mut block = Vec::with_capacity(FRAME_HEADER_LEN + message.len());
    block.push(FRAME_MARKER);
    block.extend_from_slice(&len.to_be_bytes());
    block.extend_from_slice(message);
    Ok(block)
}

fn unframe(block: &[u8]) -> CryptoResult<Vec<u8>> {
    if block.len() < FRAME_HEADER_LEN || block[0] != FRAME_MARKER {
        return Err(CryptoError::MalformedWrappedKey(
            "missing frame marker".to_string(),
        ));
    }

    let len = u16::from_be_bytes([block[1], block[2]]) as usize;
    let payload = &block[FRAME_HEADER_LEN..];
    if payload.len() != len {
        return Err(CryptoError::MalformedWrappedKey(format!(
            "frame length {} does not match payload length {}",
            len,
            payload.len()
        )));
    }

    Ok(payload.to_vec())
}

fn strip_legacy(m: &BigUint) -> Vec<u8> {
    // A zero plaintext decodes to no bytes at all
    if m.bits() == 0 {
        return Vec::new();
    }

    let mut bytes = codec::to_bytes_be(m);
    if bytes.first().is_some_and(|&b| b <= 31) {
        bytes.remove(0);
    }
    bytes
}
