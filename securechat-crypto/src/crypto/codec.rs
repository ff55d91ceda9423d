//! Big integer <-> byte/base64 conversions
//!
//! Every integer that crosses the wire (moduli, wrapped keys) is encoded as
//! big-endian bytes and then base64. Fixed-width encoding keeps leading zero
//! bytes so the byte length is determined by the key size rather than the value.
//! Decoding accepts both fixed and minimal widths.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::crypto::errors::{CryptoError, CryptoResult};

/// Minimal big-endian representation (zero encodes as a single 0x00 byte)
pub fn to_bytes_be(n: &BigUint) -> Vec<u8> {
    n.to_bytes_be()
}

/// Big-endian unsigned integer from bytes (empty input is zero)
pub fn from_bytes_be(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Number of bytes needed to hold any value below `modulus`
pub fn byte_width(modulus: &BigUint) -> usize {
    ((modulus.bits() + 7) / 8) as usize
}

/// Left-pad the big-endian representation to exactly `width` bytes
pub fn to_fixed_bytes(n: &BigUint, width: usize) -> CryptoResult<Vec<u8>> {
    if n.is_zero() {
        return Ok(vec![0u8; width]);
    }

    let bytes = n.to_bytes_be();
    if bytes.len() > width {
        return Err(CryptoError::InvalidEncoding(format!(
            "integer needs {} bytes, fixed width is {}",
            bytes.len(),
            width
        )));
    }

    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

/// Minimal-width base64
pub fn to_base64(n: &BigUint) -> String {
    STANDARD.encode(to_bytes_be(n))
}

/// Fixed-width base64
pub fn to_base64_fixed(n: &BigUint, width: usize) -> CryptoResult<String> {
    Ok(STANDARD.encode(to_fixed_bytes(n, width)?))
}

/// Decode base64 text into an integer
pub fn from_base64(text: &str) -> CryptoResult<BigUint> {
    let bytes = STANDARD.decode(text.trim())?;
    Ok(from_bytes_be(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_empty() {
        assert_eq!(to_bytes_be(&BigUint::zero()), vec![0]);
        assert_eq!(from_bytes_be(&[]), BigUint::zero());
        assert_eq!(to_fixed_bytes(&BigUint::zero(), 4).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_fixed_width_keeps_leading_zeros() {
        let n = BigUint::from(0x01_02u32);
        let fixed = to_fixed_bytes(&n, 4).unwrap();
        assert_eq!(fixed, vec![0, 0, 1, 2]);

        // Minimal and fixed encodings decode to the same value
        let minimal = to_base64(&n);
        let padded = to_base64_fixed(&n, 4).unwrap();
        assert_ne!(minimal, padded);
        assert_eq!(from_base64(&minimal).unwrap(), n);
        assert_eq!(from_base64(&padded).unwrap(), n);
    }

    #[test]
    fn test_fixed_width_too_small() {
        let n = BigUint::from(0x01_00_00u32);
        assert!(matches!(
            to_fixed_bytes(&n, 2),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(byte_width(&BigUint::from(255u32)), 1);
        assert_eq!(byte_width(&BigUint::from(256u32)), 2);
        assert_eq!(byte_width(&(BigUint::from(1u32) << 2047usize)), 256);
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            from_base64("not base64!!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }
}
