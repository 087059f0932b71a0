//! secret-sharing identity escrow
//!
//! seal: generate a fresh escrow key, encrypt the identity payload with
//! chacha20poly1305, split the key t-of-n across trustees. reconstruct:
//! verify each share against its recorded digest, recombine, confirm the
//! key against the sealed key tag, then decrypt.
//!
//! mismatched or tampered shares are detected, never silently combined
//! into a wrong key: per-share digests catch tampering before lagrange
//! interpolation, the key-confirmation tag catches a wrong reconstruction
//! before decryption, and the AEAD tag is the final backstop.

use crate::commitment::IdentityCommitment;
use crate::shamir::{self, RawShare};
use crate::trustee::TrusteeId;
use crate::{Error, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit as AeadKeyInit},
    ChaCha20Poly1305, Nonce,
};
use hmac::{digest::KeyInit, Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const ESCROW_ID_TAG: &[u8] = b"veilcred:escrow-id:v1";
const KEY_CONFIRM_TAG: &[u8] = b"veilcred:key-confirm:v1";
const SHARE_DIGEST_TAG: &[u8] = b"veilcred:share-digest:v1";

/// one of `n` shares of an escrow key, bound to one trustee
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyShare {
    /// which escrow this share belongs to
    pub escrow_id: [u8; 32],
    /// the trustee holding this share
    pub trustee: TrusteeId,
    /// shamir evaluation point
    pub index: u8,
    /// share data
    pub data: Vec<u8>,
}

impl KeyShare {
    pub fn to_hex(&self) -> String {
        hex::encode(serde_json::to_vec(self).expect("keyshare serializes"))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidShareFormat)?;
        serde_json::from_slice(&bytes).map_err(|_| Error::InvalidShareFormat)
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(serde_json::to_vec(self).expect("keyshare serializes"))
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|_| Error::InvalidShareFormat)?;
        serde_json::from_slice(&bytes).map_err(|_| Error::InvalidShareFormat)
    }
}

/// ciphertext of the verified identity fields
///
/// created once at first verification and immutable thereafter; stored at
/// a content-addressed locator by the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedIdentityPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
}

/// escrow metadata kept by the backend: everything needed to verify and
/// recombine shares, nothing that reveals the payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedIdentity {
    pub escrow_id: [u8; 32],
    pub identity_commitment: IdentityCommitment,
    pub threshold: u8,
    pub share_count: u8,
    /// key-confirmation tag: HMAC of the escrow key over the escrow id
    pub key_tag: [u8; 32],
    /// digest of each share, indexed by evaluation point - 1
    pub share_digests: Vec<[u8; 32]>,
}

/// the plaintext identity fields sealed in escrow
///
/// commitments over normalized fields rather than raw PII, plus the
/// binding key that ties activity commitments back to this identity at
/// disclosure time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub document_hash: [u8; 32],
    pub name_commitment: [u8; 32],
    pub dob_commitment: [u8; 32],
    pub address_commitment: [u8; 32],
    pub binding_key: [u8; 32],
}

impl IdentityPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serializes")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| Error::DecryptionFailed)
    }
}

/// derive a deterministic escrow id from the identity commitment and a
/// per-seal salt
pub fn generate_escrow_id(identity: &IdentityCommitment, salt: &[u8; 16]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ESCROW_ID_TAG);
    hasher.update(identity.as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// seal a payload: encrypt under a fresh key and split the key across
/// trustees
///
/// fails with `InsufficientTrustees` if `n < t` or `t < 2`.
pub fn seal(
    payload: &[u8],
    identity: &IdentityCommitment,
    trustees: &[TrusteeId],
    threshold: u8,
) -> Result<(SealedIdentity, EncryptedIdentityPayload, Vec<KeyShare>)> {
    let n = trustees.len();
    if threshold < 2 || n < threshold as usize {
        return Err(Error::InsufficientTrustees {
            have: n,
            need: threshold.max(2) as usize,
        });
    }
    if n > u8::MAX as usize {
        return Err(Error::InsufficientTrustees { have: n, need: u8::MAX as usize });
    }

    let mut rng = rand::thread_rng();

    let mut salt = [0u8; 16];
    rng.fill_bytes(&mut salt);
    let escrow_id = generate_escrow_id(identity, &salt);

    // single-use escrow key, zeroed on drop
    let mut key = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(key.as_mut());

    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);

    let ciphertext = encrypt(&key, payload, &nonce)?;
    let key_tag = key_confirmation_tag(&key, &escrow_id);

    let raw_shares = shamir::split(&key, threshold, n as u8)?;

    let share_digests: Vec<[u8; 32]> = raw_shares
        .iter()
        .map(|s| share_digest(&escrow_id, s.index, &s.data))
        .collect();

    let shares: Vec<KeyShare> = raw_shares
        .into_iter()
        .zip(trustees.iter())
        .map(|(raw, trustee)| KeyShare {
            escrow_id,
            trustee: trustee.clone(),
            index: raw.index,
            data: raw.data,
        })
        .collect();

    let sealed = SealedIdentity {
        escrow_id,
        identity_commitment: *identity,
        threshold,
        share_count: n as u8,
        key_tag,
        share_digests,
    };

    let encrypted = EncryptedIdentityPayload { ciphertext, nonce };

    Ok((sealed, encrypted, shares))
}

/// reconstruct the escrow key from at least `threshold` authentic shares
///
/// the returned key is zeroed from memory when dropped.
pub fn reconstruct(sealed: &SealedIdentity, shares: &[KeyShare]) -> Result<Zeroizing<[u8; 32]>> {
    let mut raw = Vec::with_capacity(shares.len());
    for share in shares {
        if share.escrow_id != sealed.escrow_id
            || share.index == 0
            || share.index > sealed.share_count
        {
            return Err(Error::ShareIntegrityFailed);
        }
        let expected = sealed.share_digests[share.index as usize - 1];
        if share_digest(&sealed.escrow_id, share.index, &share.data) != expected {
            return Err(Error::ShareIntegrityFailed);
        }
        raw.push(RawShare {
            index: share.index,
            data: share.data.clone(),
        });
    }

    let key = Zeroizing::new(shamir::combine(&raw, sealed.threshold)?);

    // key confirmation: a wrong key is refused before any decryption
    let mut h: HmacSha256 =
        KeyInit::new_from_slice(key.as_ref()).expect("hmac accepts any key length");
    Mac::update(&mut h, KEY_CONFIRM_TAG);
    Mac::update(&mut h, &sealed.escrow_id);
    if h.verify_slice(&sealed.key_tag).is_err() {
        return Err(Error::ShareIntegrityFailed);
    }

    Ok(key)
}

/// authenticated decryption of the sealed payload
///
/// fails with `DecryptionFailed` on tag mismatch, signaling a wrong key or
/// tampering; never returns partial plaintext.
pub fn unseal(encrypted: &EncryptedIdentityPayload, key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher: ChaCha20Poly1305 =
        AeadKeyInit::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
    let n = Nonce::from_slice(&encrypted.nonce);
    cipher
        .decrypt(n, encrypted.ciphertext.as_ref())
        .map_err(|_| Error::DecryptionFailed)
}

fn encrypt(key: &[u8; 32], plaintext: &[u8], nonce: &[u8; 12]) -> Result<Vec<u8>> {
    let cipher: ChaCha20Poly1305 =
        AeadKeyInit::new_from_slice(key).map_err(|_| Error::EncryptionFailed)?;
    let n = Nonce::from_slice(nonce);
    cipher
        .encrypt(n, plaintext)
        .map_err(|_| Error::EncryptionFailed)
}

fn key_confirmation_tag(key: &[u8; 32], escrow_id: &[u8; 32]) -> [u8; 32] {
    let mut h: HmacSha256 = KeyInit::new_from_slice(key).expect("hmac accepts any key length");
    Mac::update(&mut h, KEY_CONFIRM_TAG);
    Mac::update(&mut h, escrow_id);
    h.finalize().into_bytes().into()
}

fn share_digest(escrow_id: &[u8; 32], index: u8, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SHARE_DIGEST_TAG);
    hasher.update(escrow_id);
    hasher.update([index]);
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{derive_identity_commitment, BorrowerSecret};

    fn test_identity() -> IdentityCommitment {
        let secret = BorrowerSecret::from_bytes([5u8; 32]);
        derive_identity_commitment(&secret, b"wallet").unwrap()
    }

    fn five_trustees() -> Vec<TrusteeId> {
        (1..=5).map(|i| format!("trustee-{}", i)).collect()
    }

    #[test]
    fn test_seal_unseal_roundtrip_every_threshold_subset() {
        let payload = b"identity fields";
        let (sealed, encrypted, shares) = seal(payload, &test_identity(), &five_trustees(), 3).unwrap();

        for a in 0..5 {
            for b in (a + 1)..5 {
                for c in (b + 1)..5 {
                    let subset = vec![shares[a].clone(), shares[b].clone(), shares[c].clone()];
                    let key = reconstruct(&sealed, &subset).unwrap();
                    let recovered = unseal(&encrypted, &key).unwrap();
                    assert_eq!(payload.as_slice(), recovered.as_slice());
                }
            }
        }
    }

    #[test]
    fn test_below_threshold_fails() {
        let (sealed, _, shares) = seal(b"payload", &test_identity(), &five_trustees(), 3).unwrap();

        // trustees {1, 2}
        let subset = vec![shares[0].clone(), shares[1].clone()];
        assert!(matches!(
            reconstruct(&sealed, &subset),
            Err(Error::InsufficientShares { have: 2, need: 3 })
        ));
    }

    #[test]
    fn test_insufficient_trustees() {
        let trustees: Vec<TrusteeId> = vec!["a".into(), "b".into()];
        assert!(matches!(
            seal(b"p", &test_identity(), &trustees, 3),
            Err(Error::InsufficientTrustees { have: 2, need: 3 })
        ));
        assert!(matches!(
            seal(b"p", &test_identity(), &trustees, 1),
            Err(Error::InsufficientTrustees { .. })
        ));
    }

    #[test]
    fn test_tampered_share_detected() {
        let (sealed, _, mut shares) = seal(b"payload", &test_identity(), &five_trustees(), 3).unwrap();

        shares[1].data[0] ^= 0x01;
        let subset = vec![shares[0].clone(), shares[1].clone(), shares[2].clone()];
        assert!(matches!(
            reconstruct(&sealed, &subset),
            Err(Error::ShareIntegrityFailed)
        ));
    }

    #[test]
    fn test_foreign_shares_detected() {
        let identity = test_identity();
        let (sealed_a, _, _) = seal(b"payload a", &identity, &five_trustees(), 3).unwrap();
        let (_, _, shares_b) = seal(b"payload b", &identity, &five_trustees(), 3).unwrap();

        let subset = vec![shares_b[0].clone(), shares_b[1].clone(), shares_b[2].clone()];
        assert!(matches!(
            reconstruct(&sealed_a, &subset),
            Err(Error::ShareIntegrityFailed)
        ));
    }

    #[test]
    fn test_wrong_key_decryption_fails() {
        let (_, encrypted, _) = seal(b"payload", &test_identity(), &five_trustees(), 3).unwrap();
        let wrong_key = [0u8; 32];
        assert!(matches!(
            unseal(&encrypted, &wrong_key),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_identity_payload_roundtrip() {
        let payload = IdentityPayload {
            document_hash: [1u8; 32],
            name_commitment: [2u8; 32],
            dob_commitment: [3u8; 32],
            address_commitment: [4u8; 32],
            binding_key: [5u8; 32],
        };

        let (sealed, encrypted, shares) =
            seal(&payload.to_bytes(), &test_identity(), &five_trustees(), 3).unwrap();

        let key = reconstruct(&sealed, &shares[..3]).unwrap();
        let recovered = IdentityPayload::from_bytes(&unseal(&encrypted, &key).unwrap()).unwrap();
        assert_eq!(payload, recovered);
    }

    #[test]
    fn test_share_wire_encodings() {
        let (_, _, shares) = seal(b"payload", &test_identity(), &five_trustees(), 3).unwrap();

        let hex = shares[0].to_hex();
        let from_hex = KeyShare::from_hex(&hex).unwrap();
        assert_eq!(from_hex.index, shares[0].index);
        assert_eq!(from_hex.data, shares[0].data);

        let b64 = shares[0].to_base64();
        let from_b64 = KeyShare::from_base64(&b64).unwrap();
        assert_eq!(from_b64.data, shares[0].data);
    }
}
