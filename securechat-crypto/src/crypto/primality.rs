//! Miller-Rabin probabilistic primality testing
//!
//! Witnesses and prime candidates are drawn from the operating system CSPRNG.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::rngs::OsRng;

use crate::crypto::arith::mod_pow;

/// Rounds used for identity key primes (false-positive rate <= 4^-40)
pub const DEFAULT_ROUNDS: u32 = 40;

/// Odd primes used to reject candidates before running Miller-Rabin
const SMALL_PRIMES: [u32; 53] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// Miller-Rabin test with `rounds` random witnesses
///
/// Returns `false` as soon as a witness proves `n` composite. A `true` result
/// is wrong with probability at most `4^-rounds`.
pub fn is_probable_prime(n: &BigUint, rounds: u32) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if *n <= BigUint::one() {
        return false;
    }
    if *n == two || *n == three {
        return true;
    }
    if !n.bit(0) {
        return false;
    }

    let n_minus_one = n - 1u32;

    // n - 1 = 2^s * d with d odd
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    let mut rng = OsRng;
    for _ in 0..rounds {
        // Uniform witness in [2, n - 2]; the upper bound is exclusive
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        if !passes_round(&a, &d, s, n, &n_minus_one) {
            return false;
        }
    }

    true
}

fn passes_round(a: &BigUint, d: &BigUint, s: u64, n: &BigUint, n_minus_one: &BigUint) -> bool {
    let Ok(mut x) = mod_pow(a, d, n) else {
        return false;
    };

    if x.is_one() || x == *n_minus_one {
        return true;
    }

    for _ in 1..s {
        x = (&x * &x) % n;
        if x == *n_minus_one {
            return true;
        }
        if x.is_one() {
            return false;
        }
    }

    false
}

/// Cheap trial division; only ever rejects
pub fn has_small_factor(n: &BigUint) -> bool {
    SMALL_PRIMES.iter().any(|&p| {
        let p = BigUint::from(p);
        *n != p && (n % &p).is_zero()
    })
}

/// Random odd integer of exactly `bits` bits with the top two bits set
///
/// Setting both top bits makes the product of two such numbers exactly
/// `2 * bits` long.
pub fn random_odd_candidate(bits: u64) -> BigUint {
    let bits = bits.max(2);
    let mut candidate = OsRng.gen_biguint(bits);
    candidate.set_bit(bits - 1, true);
    candidate.set_bit(bits - 2, true);
    candidate.set_bit(0, true);
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_PRIMES: [u64; 8] = [2, 3, 5, 7, 61, 7919, 2_147_483_647, 1_000_000_007];
    const KNOWN_COMPOSITES: [u64; 8] = [4, 9, 341, 561, 1105, 1729, 2821, 6601];

    #[test]
    fn test_trivial_inputs() {
        assert!(!is_probable_prime(&BigUint::zero(), DEFAULT_ROUNDS));
        assert!(!is_probable_prime(&BigUint::one(), DEFAULT_ROUNDS));
        assert!(!is_probable_prime(&BigUint::from(100u32), DEFAULT_ROUNDS));
    }

    #[test]
    fn test_known_primes_accepted() {
        // Repeat to make sure random witnesses never reject a prime
        for _ in 0..20 {
            for p in KNOWN_PRIMES {
                assert!(is_probable_prime(&BigUint::from(p), DEFAULT_ROUNDS), "{} rejected", p);
            }
        }
    }

    #[test]
    fn test_carmichael_and_pseudoprimes_rejected() {
        for c in KNOWN_COMPOSITES {
            assert!(!is_probable_prime(&BigUint::from(c), DEFAULT_ROUNDS), "{} accepted", c);
        }
    }

    #[test]
    fn test_single_round_rejects_composites_statistically() {
        // A single round misses a composite with probability <= 1/4
        for c in [341u64, 561] {
            let rejected = (0..64)
                .filter(|_| !is_probable_prime(&BigUint::from(c), 1))
                .count();
            assert!(rejected > 32, "{} rejected only {} times", c, rejected);
        }
    }

    #[test]
    fn test_mersenne_prime_127() {
        let m127 = (BigUint::one() << 127usize) - 1u32;
        assert!(is_probable_prime(&m127, DEFAULT_ROUNDS));
        assert!(!is_probable_prime(&(&m127 * &m127), DEFAULT_ROUNDS));
    }

    #[test]
    fn test_small_factor_sieve() {
        assert!(has_small_factor(&BigUint::from(3u32 * 1_000_003)));
        assert!(!has_small_factor(&BigUint::from(7u32)));
        assert!(!has_small_factor(&BigUint::from(1_000_003u32)));
    }

    #[test]
    fn test_random_odd_candidate_tiny_widths() {
        assert_eq!(random_odd_candidate(0), BigUint::from(3u32));
        assert_eq!(random_odd_candidate(1), BigUint::from(3u32));
    }

    #[test]
    fn test_random_odd_candidate_shape() {
        for bits in [16u64, 64, 512] {
            let c = random_odd_candidate(bits);
            assert_eq!(c.bits(), bits);
            assert!(c.bit(0));
            assert!(c.bit(bits - 2));
        }
    }
}
