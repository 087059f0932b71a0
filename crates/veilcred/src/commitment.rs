//! commitment engine: identity and activity commitments
//!
//! two commitments derive from one borrower secret:
//!
//! - identity commitment `H(secret, wallet_binding)` - permanent, computed
//!   once per borrower
//! - activity commitment `H(secret, score, nonce)` - regenerated on every
//!   proof refresh, a fresh nonce per call keeps equal scores unlinkable
//!   across time
//!
//! without the secret the two are uncorrelatable. the one place they must
//! be correlated is disclosure, via [`verify_binding`] and the binding tag
//! carried in the sealed payload.

use crate::field::{self, FieldScalar};
use crate::Result;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use hmac::{digest::KeyInit, Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Blake2b256 = Blake2b<U32>;
type HmacSha256 = Hmac<Sha256>;

const IDENTITY_TAG: &[u8] = b"veilcred:identity:v1";
const ACTIVITY_TAG: &[u8] = b"veilcred:activity:v1";
const BINDING_KEY_TAG: &[u8] = b"veilcred:binding-key:v1";
const BINDING_TAG: &[u8] = b"veilcred:binding-tag:v1";

/// the borrower's private scalar, root of all derived commitments
///
/// generated client-side once and never rotated; rotation would invalidate
/// the permanent identity binding and amounts to a new identity.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BorrowerSecret([u8; 32]);

impl BorrowerSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        BorrowerSecret(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        BorrowerSecret(bytes)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// permanent identity commitment, stable across all score updates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityCommitment(pub FieldScalar);

/// per-proof activity commitment, regenerated whenever the score changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityCommitment(pub FieldScalar);

impl IdentityCommitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(IdentityCommitment(FieldScalar::from_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl ActivityCommitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(ActivityCommitment(FieldScalar::from_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

/// derive the permanent identity commitment
///
/// pure and idempotent. first-use-wins is enforced by the caller, not here.
pub fn derive_identity_commitment(
    secret: &BorrowerSecret,
    wallet_binding: &[u8],
) -> Result<IdentityCommitment> {
    let mut hasher = Blake2b256::new();
    hasher.update(IDENTITY_TAG);
    hasher.update(secret.as_bytes());
    hasher.update(wallet_binding);
    let digest: [u8; 32] = hasher.finalize().into();
    Ok(IdentityCommitment(field::reduce(&digest)?))
}

/// derive a fresh activity commitment for the current score
///
/// the nonce must be fresh per call: two equal-score proofs with reused
/// nonces would produce equal commitments and leak score equality to
/// observers.
pub fn derive_activity_commitment(
    secret: &BorrowerSecret,
    score: u64,
    nonce: &[u8; 32],
) -> Result<ActivityCommitment> {
    let mut hasher = Blake2b256::new();
    hasher.update(ACTIVITY_TAG);
    hasher.update(secret.as_bytes());
    hasher.update(score.to_le_bytes());
    hasher.update(nonce);
    let digest: [u8; 32] = hasher.finalize().into();
    Ok(ActivityCommitment(field::reduce(&digest)?))
}

/// derive the binding key carried inside the sealed identity payload
///
/// whoever can produce binding tags under this key holds the borrower
/// secret; the disclosure path checks tags against the unsealed payload's
/// copy of the key before exposing anything.
pub fn binding_key(secret: &BorrowerSecret) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(BINDING_KEY_TAG);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// tag tying one activity commitment to one identity commitment
pub fn binding_tag(
    key: &[u8; 32],
    identity: &IdentityCommitment,
    activity: &ActivityCommitment,
) -> [u8; 32] {
    let mut h: HmacSha256 = KeyInit::new_from_slice(key).expect("hmac accepts any key length");
    Mac::update(&mut h, BINDING_TAG);
    Mac::update(&mut h, identity.as_bytes());
    Mac::update(&mut h, activity.as_bytes());
    h.finalize().into_bytes().into()
}

/// confirm that an activity-side application traces back to the claimed
/// identity
///
/// this is the cryptographic step that justifies exposing identity only
/// for loans actually tied to that borrower.
pub fn verify_binding(
    secret: &BorrowerSecret,
    identity: &IdentityCommitment,
    activity: &ActivityCommitment,
    tag: &[u8; 32],
) -> bool {
    let key = binding_key(secret);
    verify_binding_with_key(&key, identity, activity, tag)
}

/// same check given the binding key instead of the raw secret
pub fn verify_binding_with_key(
    key: &[u8; 32],
    identity: &IdentityCommitment,
    activity: &ActivityCommitment,
    tag: &[u8; 32],
) -> bool {
    let mut h: HmacSha256 = KeyInit::new_from_slice(key).expect("hmac accepts any key length");
    Mac::update(&mut h, BINDING_TAG);
    Mac::update(&mut h, identity.as_bytes());
    Mac::update(&mut h, activity.as_bytes());
    h.verify_slice(tag).is_ok()
}

/// a borrower-registered link from an activity commitment to the identity
/// commitment whose escrow covers it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BindingRecord {
    pub activity_commitment: ActivityCommitment,
    pub identity_commitment: IdentityCommitment,
    pub tag: [u8; 32],
}

impl BindingRecord {
    /// build a record client-side from the borrower secret
    pub fn create(
        secret: &BorrowerSecret,
        identity: &IdentityCommitment,
        activity: &ActivityCommitment,
    ) -> Self {
        let key = binding_key(secret);
        BindingRecord {
            activity_commitment: *activity,
            identity_commitment: *identity,
            tag: binding_tag(&key, identity, activity),
        }
    }
}

/// fresh nonce for an activity commitment
pub fn random_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_deterministic() {
        let secret = BorrowerSecret::from_bytes([7u8; 32]);
        let a = derive_identity_commitment(&secret, b"wallet-1").unwrap();
        let b = derive_identity_commitment(&secret, b"wallet-1").unwrap();
        assert_eq!(a, b);

        let c = derive_identity_commitment(&secret, b"wallet-2").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_activity_nonce_separates_equal_scores() {
        let secret = BorrowerSecret::from_bytes([9u8; 32]);
        let a = derive_activity_commitment(&secret, 700, &[1u8; 32]).unwrap();
        let b = derive_activity_commitment(&secret, 700, &[2u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_activity_no_collisions_over_random_samples() {
        let secret = BorrowerSecret::generate();
        let mut seen = HashSet::new();
        for i in 0..10_000u64 {
            let c = derive_activity_commitment(&secret, i % 850, &random_nonce()).unwrap();
            assert!(seen.insert(*c.as_bytes()), "collision at sample {}", i);
        }
    }

    #[test]
    fn test_identity_activity_unlinkable_bytes() {
        let secret = BorrowerSecret::from_bytes([3u8; 32]);
        let id = derive_identity_commitment(&secret, b"wallet").unwrap();
        let act = derive_activity_commitment(&secret, 500, &[0u8; 32]).unwrap();
        assert_ne!(id.as_bytes(), act.as_bytes());
    }

    #[test]
    fn test_verify_binding() {
        let secret = BorrowerSecret::generate();
        let id = derive_identity_commitment(&secret, b"wallet").unwrap();
        let act = derive_activity_commitment(&secret, 640, &random_nonce()).unwrap();

        let record = BindingRecord::create(&secret, &id, &act);
        assert!(verify_binding(&secret, &id, &act, &record.tag));

        // a different secret cannot produce a valid tag for this pair
        let other = BorrowerSecret::generate();
        assert!(!verify_binding(&other, &id, &act, &record.tag));

        // tag does not transfer to another activity commitment
        let act2 = derive_activity_commitment(&secret, 641, &random_nonce()).unwrap();
        assert!(!verify_binding(&secret, &id, &act2, &record.tag));
    }
}
