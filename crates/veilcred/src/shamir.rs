//! threshold secret sharing using shamir's scheme over GF(256)
//!
//! t-of-n over per-byte polynomials: any t shares reconstruct the secret,
//! fewer reveal nothing (information-theoretic).

use crate::{Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// length of secrets this module splits (escrow keys)
pub const SECRET_LEN: usize = 32;

/// a single raw share: evaluation of the per-byte polynomials at `index`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawShare {
    /// evaluation point (1-indexed, must be non-zero)
    pub index: u8,
    /// share data (same length as secret)
    pub data: Vec<u8>,
}

/// carry-less multiplication modulo the AES reduction polynomial
/// x^8 + x^4 + x^3 + x + 1
fn gf256_mul(mut a: u8, mut b: u8) -> u8 {
    let mut acc = 0u8;
    for _ in 0..8 {
        if b & 1 == 1 {
            acc ^= a;
        }
        let overflow = a & 0x80 != 0;
        a <<= 1;
        if overflow {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    acc
}

/// multiplicative inverse as a^254 (a^255 = 1 for nonzero a), by
/// square-and-multiply; maps 0 to 0
fn gf256_inv(a: u8) -> u8 {
    let mut acc = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = gf256_mul(acc, base);
        }
        base = gf256_mul(base, base);
        exp >>= 1;
    }
    acc
}

fn gf256_div(a: u8, b: u8) -> u8 {
    gf256_mul(a, gf256_inv(b))
}

/// horner evaluation of a polynomial (coefficients low to high) at x
fn poly_eval(coeffs: &[u8], x: u8) -> u8 {
    coeffs
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf256_mul(acc, x) ^ c)
}

/// lagrange interpolation at x=0, recovering the constant term
///
/// addition and subtraction coincide in GF(256), so (0 - xj) is just xj
/// and (xi - xj) is xi ^ xj.
fn lagrange_interpolate(points: &[(u8, u8)]) -> u8 {
    let mut secret = 0u8;
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut basis = 1u8;
        for (j, &(xj, _)) in points.iter().enumerate() {
            if i != j {
                basis = gf256_mul(basis, gf256_div(xj, xi ^ xj));
            }
        }
        secret ^= gf256_mul(yi, basis);
    }
    secret
}

/// split a 32-byte secret into `count` shares with threshold `t`
///
/// a threshold of 1 defeats the purpose of sharing and is rejected.
pub fn split(secret: &[u8; SECRET_LEN], threshold: u8, count: u8) -> Result<Vec<RawShare>> {
    if threshold < 2 || count < threshold {
        return Err(Error::InsufficientTrustees {
            have: count as usize,
            need: threshold.max(2) as usize,
        });
    }

    let mut rng = rand::thread_rng();
    let mut shares: Vec<RawShare> = (1..=count)
        .map(|index| RawShare {
            index,
            data: vec![0u8; SECRET_LEN],
        })
        .collect();

    // one degree-(t-1) polynomial per secret byte, constant term = the byte
    let mut coeffs = vec![0u8; threshold as usize];
    for i in 0..SECRET_LEN {
        coeffs[0] = secret[i];
        rng.fill_bytes(&mut coeffs[1..]);

        for share in shares.iter_mut() {
            share.data[i] = poly_eval(&coeffs, share.index);
        }
    }

    Ok(shares)
}

/// reconstruct the secret from at least `threshold` distinct shares
pub fn combine(shares: &[RawShare], threshold: u8) -> Result<[u8; SECRET_LEN]> {
    let mut seen = [false; 256];
    let mut distinct: Vec<&RawShare> = Vec::new();
    for share in shares {
        if share.index == 0 || share.data.len() != SECRET_LEN {
            return Err(Error::InvalidShareFormat);
        }
        if !seen[share.index as usize] {
            seen[share.index as usize] = true;
            distinct.push(share);
        }
    }

    if distinct.len() < threshold as usize {
        return Err(Error::InsufficientShares {
            have: distinct.len(),
            need: threshold as usize,
        });
    }

    let used = &distinct[..threshold as usize];
    let mut secret = [0u8; SECRET_LEN];

    for i in 0..SECRET_LEN {
        let points: Vec<(u8, u8)> = used.iter().map(|s| (s.index, s.data[i])).collect();
        secret[i] = lagrange_interpolate(&points);
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gf256_field_laws() {
        // 0x53 and 0xca are the textbook AES inverse pair
        assert_eq!(gf256_mul(0x53, 0xca), 1);

        for a in 1..=255u8 {
            assert_eq!(gf256_mul(a, gf256_inv(a)), 1, "no inverse for {:#04x}", a);
            assert_eq!(gf256_div(a, a), 1);
            assert_eq!(gf256_mul(a, 1), a);
        }
        assert_eq!(gf256_inv(0), 0);

        // evaluating at x=0 yields the constant term
        assert_eq!(poly_eval(&[0x2a, 0x07, 0x99], 0), 0x2a);
    }

    #[test]
    fn test_split_combine_3_of_5() {
        let secret = [42u8; 32];
        let shares = split(&secret, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);

        // trustees {1, 3, 5}
        let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
        assert_eq!(combine(&subset, 3).unwrap(), secret);

        // all 5 also works
        assert_eq!(combine(&shares, 3).unwrap(), secret);
    }

    #[test]
    fn test_below_threshold_fails() {
        let secret = [42u8; 32];
        let shares = split(&secret, 3, 5).unwrap();

        // trustees {1, 2}
        let subset = vec![shares[0].clone(), shares[1].clone()];
        assert!(matches!(
            combine(&subset, 3),
            Err(Error::InsufficientShares { have: 2, need: 3 })
        ));
    }

    #[test]
    fn test_every_threshold_subset_reconstructs() {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let shares = split(&secret, 3, 5).unwrap();

        for a in 0..5 {
            for b in (a + 1)..5 {
                for c in (b + 1)..5 {
                    let subset = vec![shares[a].clone(), shares[b].clone(), shares[c].clone()];
                    assert_eq!(combine(&subset, 3).unwrap(), secret);
                }
            }
        }
    }

    #[test]
    fn test_duplicate_shares_do_not_count() {
        let secret = [7u8; 32];
        let shares = split(&secret, 2, 3).unwrap();

        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert!(matches!(
            combine(&dup, 2),
            Err(Error::InsufficientShares { .. })
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        let secret = [1u8; 32];
        assert!(split(&secret, 1, 3).is_err());
        assert!(split(&secret, 4, 3).is_err());
        assert!(split(&secret, 2, 3).is_ok());
    }
}
