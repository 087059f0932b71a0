//! field codec: reduce 256-bit hash outputs into the ledger's scalar field
//!
//! every commitment the system touches goes through [`reduce`], on both the
//! proof-generating client and the ledger-consuming backend, so the same
//! logical commitment always reduces to the same scalar. the policy is
//! truncate-then-reject: mask down to the field's bit width and refuse any
//! residual value at or above the modulus. silent wrapping is never used,
//! it creates collision risk between distinct digests.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// BN254 scalar field modulus, big endian
pub const MODULUS: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58,
    0x5d, 0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00,
    0x00, 0x01,
];

/// bit width kept after truncation (one below the modulus width, so every
/// masked value is strictly below the modulus)
pub const FIELD_BITS: usize = 253;

/// minimum entropy a reduction must retain for collision probability to
/// stay negligible
pub const MIN_REDUCED_BITS: usize = 128;

/// a canonical scalar in the ledger's field, big-endian bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldScalar(pub [u8; 32]);

impl FieldScalar {
    /// parse raw bytes, rejecting non-canonical values
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        if !lt_modulus(&bytes) {
            return Err(Error::InvalidScalar);
        }
        Ok(FieldScalar(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidScalar)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidScalar)?;
        Self::from_bytes(arr)
    }
}

impl std::fmt::Debug for FieldScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldScalar({}..)", &self.to_hex()[..16])
    }
}

/// reduce a 256-bit digest into the scalar field
///
/// deterministic: same digest always yields the same scalar. keeps
/// [`FIELD_BITS`] bits of the input.
pub fn reduce(digest: &[u8; 32]) -> Result<FieldScalar> {
    reduce_bits(digest, FIELD_BITS)
}

/// reduce keeping only the low `keep_bits` bits of the digest
///
/// fails with `FieldOverflow` if `keep_bits` retains less entropy than
/// [`MIN_REDUCED_BITS`], or if the masked value still reaches the modulus.
pub fn reduce_bits(digest: &[u8; 32], keep_bits: usize) -> Result<FieldScalar> {
    if keep_bits < MIN_REDUCED_BITS || keep_bits > 256 {
        return Err(Error::FieldOverflow);
    }

    let mut out = *digest;
    let drop_bits = 256 - keep_bits;
    let drop_bytes = drop_bits / 8;
    let drop_rem = drop_bits % 8;

    for b in out.iter_mut().take(drop_bytes) {
        *b = 0;
    }
    if drop_rem > 0 {
        out[drop_bytes] &= 0xff >> drop_rem;
    }

    // reject rather than wrap: a masked value at or above the modulus is
    // refused outright
    if !lt_modulus(&out) {
        return Err(Error::FieldOverflow);
    }

    Ok(FieldScalar(out))
}

/// big-endian comparison against the modulus
fn lt_modulus(bytes: &[u8; 32]) -> bool {
    for (b, m) in bytes.iter().zip(MODULUS.iter()) {
        if b < m {
            return true;
        }
        if b > m {
            return false;
        }
    }
    false // equal to modulus is not canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_deterministic() {
        let digest = [0xabu8; 32];
        let a = reduce(&digest).unwrap();
        let b = reduce(&digest).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reduce_always_below_modulus() {
        // all-ones digest masks down to 2^253 - 1, still below the modulus
        let digest = [0xffu8; 32];
        let scalar = reduce(&digest).unwrap();
        assert!(lt_modulus(scalar.as_bytes()));
        assert_eq!(scalar.as_bytes()[0], 0x1f);
    }

    #[test]
    fn test_reduce_masks_top_bits_only() {
        let mut digest = [0u8; 32];
        digest[0] = 0xe0; // exactly the three masked bits
        digest[31] = 0x07;
        let scalar = reduce(&digest).unwrap();
        assert_eq!(scalar.as_bytes()[0], 0x00);
        assert_eq!(scalar.as_bytes()[31], 0x07);
    }

    #[test]
    fn test_entropy_floor() {
        let digest = [0x11u8; 32];
        assert!(matches!(
            reduce_bits(&digest, MIN_REDUCED_BITS - 1),
            Err(Error::FieldOverflow)
        ));
        assert!(reduce_bits(&digest, MIN_REDUCED_BITS).is_ok());
    }

    #[test]
    fn test_non_canonical_rejected() {
        assert!(matches!(
            FieldScalar::from_bytes(MODULUS),
            Err(Error::InvalidScalar)
        ));
        let mut above = MODULUS;
        above[31] += 1;
        assert!(FieldScalar::from_bytes(above).is_err());

        let mut below = MODULUS;
        below[31] -= 1;
        assert!(FieldScalar::from_bytes(below).is_ok());
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = [0x42u8; 32];
        let scalar = reduce(&digest).unwrap();
        let parsed = FieldScalar::from_hex(&scalar.to_hex()).unwrap();
        assert_eq!(scalar, parsed);
    }
}
