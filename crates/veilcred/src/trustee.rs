//! trustee channels: share distribution and collection
//!
//! each trustee is an independent, non-colluding custodian reachable over
//! an authenticated private channel. a share is only ever visible to its
//! trustee and the original sealer. distribution stays pending until at
//! least `threshold` trustees have acknowledged receipt; reconstruction is
//! refused before that.

use crate::escrow::KeyShare;
use crate::{Error, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub type TrusteeId = String;

const ACK_TAG: &[u8] = b"veilcred:share-ack:v1";

/// signed acknowledgement that a trustee received its share
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrusteeAck {
    pub trustee: TrusteeId,
    pub escrow_id: [u8; 32],
    pub share_index: u8,
    /// ed25519 signature over the ack message, hex encoded
    pub signature: String,
}

/// message a trustee signs when acknowledging a share
pub fn ack_message(escrow_id: &[u8; 32], share_index: u8) -> Vec<u8> {
    let mut msg = Vec::with_capacity(ACK_TAG.len() + 33);
    msg.extend_from_slice(ACK_TAG);
    msg.extend_from_slice(escrow_id);
    msg.push(share_index);
    msg
}

/// verify an ack signature against the trustee's public key
pub fn verify_ack(ack: &TrusteeAck, key: &VerifyingKey) -> bool {
    let Ok(bytes) = hex::decode(&ack.signature) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return false;
    };
    let sig = Signature::from_bytes(&sig_bytes);
    key.verify(&ack_message(&ack.escrow_id, ack.share_index), &sig)
        .is_ok()
}

/// request/response channel to trustees
#[async_trait]
pub trait TrusteeChannel: Send + Sync {
    /// deliver a share to its trustee, returning a signed acknowledgement
    async fn send(&self, share: &KeyShare) -> Result<TrusteeAck>;

    /// request a trustee's share back for reconstruction
    async fn receive(&self, trustee: &TrusteeId, escrow_id: &[u8; 32]) -> Result<KeyShare>;

    /// public key for verifying a trustee's acks, if known
    fn verifying_key(&self, trustee: &TrusteeId) -> Option<VerifyingKey>;
}

/// outcome of distributing one escrow's shares
#[derive(Clone, Debug)]
pub struct DistributionReport {
    pub acks: Vec<TrusteeAck>,
    pub failed: Vec<(TrusteeId, String)>,
    pub threshold: u8,
}

impl DistributionReport {
    /// true once enough trustees acknowledged for reconstruction to be
    /// possible later
    pub fn is_complete(&self) -> bool {
        self.acks.len() >= self.threshold as usize
    }

    pub fn acked_trustees(&self) -> Vec<TrusteeId> {
        self.acks.iter().map(|a| a.trustee.clone()).collect()
    }
}

/// send each share to its trustee over the private channel
///
/// partial failure (some trustees unreachable) is reported, not fatal:
/// the escrow stays pending-distribution until acks reach the threshold.
/// acks with bad signatures count as failures.
pub async fn distribute<C: TrusteeChannel>(
    channel: &C,
    shares: &[KeyShare],
    threshold: u8,
) -> DistributionReport {
    let results = join_all(shares.iter().map(|share| channel.send(share))).await;

    let mut acks = Vec::new();
    let mut failed = Vec::new();

    for (share, result) in shares.iter().zip(results) {
        match result {
            Ok(ack) => {
                let verified = match channel.verifying_key(&share.trustee) {
                    Some(key) => verify_ack(&ack, &key),
                    None => false,
                };
                if verified {
                    acks.push(ack);
                } else {
                    failed.push((share.trustee.clone(), "bad ack signature".into()));
                }
            }
            Err(e) => failed.push((share.trustee.clone(), e.to_string())),
        }
    }

    DistributionReport {
        acks,
        failed,
        threshold,
    }
}

/// collect shares back from trustees, each request bounded by `timeout`
///
/// returns as many authentic responses as arrived; the caller decides
/// whether they meet the threshold.
pub async fn collect_shares<C: TrusteeChannel>(
    channel: &C,
    trustees: &[TrusteeId],
    escrow_id: &[u8; 32],
    timeout: Duration,
) -> Vec<KeyShare> {
    let results = join_all(trustees.iter().map(|trustee| {
        tokio::time::timeout(timeout, channel.receive(trustee, escrow_id))
    }))
    .await;

    let mut shares = Vec::new();
    for (trustee, result) in trustees.iter().zip(results) {
        match result {
            Ok(Ok(share)) => shares.push(share),
            Ok(Err(e)) => tracing::warn!("trustee {} refused share request: {}", trustee, e),
            Err(_) => tracing::warn!("trustee {} timed out", trustee),
        }
    }
    shares
}

struct TrusteeNode {
    signing_key: SigningKey,
    shares: HashMap<[u8; 32], KeyShare>,
}

/// in-process trustees for tests and dev deployments
pub struct LocalTrustees {
    nodes: Mutex<HashMap<TrusteeId, TrusteeNode>>,
    keys: HashMap<TrusteeId, VerifyingKey>,
    down: Mutex<HashSet<TrusteeId>>,
}

impl LocalTrustees {
    pub fn new(trustees: &[TrusteeId]) -> Self {
        let mut nodes = HashMap::new();
        let mut keys = HashMap::new();
        for id in trustees {
            let signing_key = SigningKey::generate(&mut rand::thread_rng());
            keys.insert(id.clone(), signing_key.verifying_key());
            nodes.insert(
                id.clone(),
                TrusteeNode {
                    signing_key,
                    shares: HashMap::new(),
                },
            );
        }
        LocalTrustees {
            nodes: Mutex::new(nodes),
            keys,
            down: Mutex::new(HashSet::new()),
        }
    }

    /// simulate an unreachable trustee
    pub fn set_down(&self, trustee: &str, down: bool) {
        let mut set = self.down.lock().expect("lock poisoned");
        if down {
            set.insert(trustee.to_string());
        } else {
            set.remove(trustee);
        }
    }

    fn is_down(&self, trustee: &str) -> bool {
        self.down.lock().expect("lock poisoned").contains(trustee)
    }
}

#[async_trait]
impl TrusteeChannel for LocalTrustees {
    async fn send(&self, share: &KeyShare) -> Result<TrusteeAck> {
        if self.is_down(&share.trustee) {
            return Err(Error::Trustee(format!("{} unreachable", share.trustee)));
        }
        let mut nodes = self.nodes.lock().expect("lock poisoned");
        let node = nodes
            .get_mut(&share.trustee)
            .ok_or_else(|| Error::Trustee(format!("unknown trustee {}", share.trustee)))?;

        node.shares.insert(share.escrow_id, share.clone());

        let sig = node
            .signing_key
            .sign(&ack_message(&share.escrow_id, share.index));
        Ok(TrusteeAck {
            trustee: share.trustee.clone(),
            escrow_id: share.escrow_id,
            share_index: share.index,
            signature: hex::encode(sig.to_bytes()),
        })
    }

    async fn receive(&self, trustee: &TrusteeId, escrow_id: &[u8; 32]) -> Result<KeyShare> {
        if self.is_down(trustee) {
            return Err(Error::Trustee(format!("{} unreachable", trustee)));
        }
        let nodes = self.nodes.lock().expect("lock poisoned");
        nodes
            .get(trustee)
            .and_then(|node| node.shares.get(escrow_id))
            .cloned()
            .ok_or_else(|| Error::Trustee(format!("{} holds no share for this escrow", trustee)))
    }

    fn verifying_key(&self, trustee: &TrusteeId) -> Option<VerifyingKey> {
        self.keys.get(trustee).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{derive_identity_commitment, BorrowerSecret};
    use crate::escrow;

    fn setup() -> (LocalTrustees, Vec<TrusteeId>, crate::escrow::SealedIdentity, Vec<KeyShare>) {
        let trustees: Vec<TrusteeId> = (1..=5).map(|i| format!("trustee-{}", i)).collect();
        let channel = LocalTrustees::new(&trustees);
        let secret = BorrowerSecret::from_bytes([8u8; 32]);
        let identity = derive_identity_commitment(&secret, b"wallet").unwrap();
        let (sealed, _, shares) = escrow::seal(b"payload", &identity, &trustees, 3).unwrap();
        (channel, trustees, sealed, shares)
    }

    #[tokio::test]
    async fn test_distribute_all_reachable() {
        let (channel, _, _, shares) = setup();
        let report = distribute(&channel, &shares, 3).await;
        assert_eq!(report.acks.len(), 5);
        assert!(report.failed.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_partial_distribution_stays_pending() {
        let (channel, _, _, shares) = setup();
        channel.set_down("trustee-1", true);
        channel.set_down("trustee-2", true);
        channel.set_down("trustee-3", true);

        let report = distribute(&channel, &shares, 3).await;
        assert_eq!(report.acks.len(), 2);
        assert_eq!(report.failed.len(), 3);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_ack_signatures_verify() {
        let (channel, _, _, shares) = setup();
        let report = distribute(&channel, &shares, 3).await;

        for ack in &report.acks {
            let key = channel.verifying_key(&ack.trustee).unwrap();
            assert!(verify_ack(ack, &key));

            // tampered index must not verify
            let mut bad = ack.clone();
            bad.share_index ^= 1;
            assert!(!verify_ack(&bad, &key));
        }
    }

    #[tokio::test]
    async fn test_collect_shares_skips_unreachable() {
        let (channel, trustees, sealed, shares) = setup();
        distribute(&channel, &shares, 3).await;
        channel.set_down("trustee-4", true);

        let collected =
            collect_shares(&channel, &trustees, &sealed.escrow_id, Duration::from_secs(1)).await;
        assert_eq!(collected.len(), 4);

        let key = escrow::reconstruct(&sealed, &collected[..3]).unwrap();
        assert_eq!(key.len(), 32);
    }
}
