//! Modular arithmetic over arbitrary-precision integers
//!
//! Pure functions only. Exponents are unsigned so negative exponents cannot be
//! expressed; a zero modulus is rejected rather than panicking on division.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Signed, Zero};

use crate::crypto::errors::{CryptoError, CryptoResult};

/// Square-and-multiply modular exponentiation
pub fn mod_pow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> CryptoResult<BigUint> {
    if modulus.is_zero() {
        return Err(CryptoError::InvalidKey("modulus must be non-zero".to_string()));
    }
    if modulus.is_one() {
        return Ok(BigUint::zero());
    }

    let mut result = BigUint::one();
    let mut base = base % modulus;

    // Scan exponent bits from least significant upwards
    for i in 0..exponent.bits() {
        if exponent.bit(i) {
            result = (&result * &base) % modulus;
        }
        base = (&base * &base) % modulus;
    }

    Ok(result)
}

/// Extended Euclid: returns `(g, x, y)` with `a*x + b*y = g`
///
/// Iterative so deep inputs cannot exhaust the stack.
pub fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_x, mut x) = (BigInt::one(), BigInt::zero());
    let (mut old_y, mut y) = (BigInt::zero(), BigInt::one());

    while !r.is_zero() {
        let q = &old_r / &r;

        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);

        let next_x = &old_x - &q * &x;
        old_x = std::mem::replace(&mut x, next_x);

        let next_y = &old_y - &q * &y;
        old_y = std::mem::replace(&mut y, next_y);
    }

    // Keep the gcd non-negative for negative inputs
    if old_r.is_negative() {
        (-old_r, -old_x, -old_y)
    } else {
        (old_r, old_x, old_y)
    }
}

/// Greatest common divisor of unsigned integers
pub fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    let (g, _, _) = extended_gcd(&to_signed(a), &to_signed(b));
    g.magnitude().clone()
}

/// Least common multiple; `lcm(0, x) = 0`
pub fn lcm(a: &BigUint, b: &BigUint) -> BigUint {
    if a.is_zero() || b.is_zero() {
        return BigUint::zero();
    }
    (a * b) / gcd(a, b)
}

/// Inverse of `a` modulo `m`, normalised into `[0, m)`
///
/// Returns `None` when `gcd(a, m) != 1`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }

    let m_int = to_signed(m);
    let (g, x, _) = extended_gcd(&to_signed(a), &m_int);
    if !g.is_one() {
        return None;
    }

    let normalised = ((x % &m_int) + &m_int) % &m_int;
    normalised.to_biguint()
}

fn to_signed(n: &BigUint) -> BigInt {
    BigInt::from_biguint(Sign::Plus, n.clone())
}
