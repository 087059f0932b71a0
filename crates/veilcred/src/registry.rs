//! escrow registry: sealed escrows, trustee acknowledgements, and binding
//! records
//!
//! everything here is backend-local bookkeeping. the payload ciphertext
//! itself lives in the content-addressed store; only metadata and the
//! borrower-registered bindings are kept in sled.

use crate::commitment::{ActivityCommitment, BindingRecord, IdentityCommitment};
use crate::escrow::{KeyShare, SealedIdentity};
use crate::trustee::TrusteeId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// a sealed escrow plus its distribution state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredEscrow {
    pub sealed: SealedIdentity,
    /// content address of the encrypted payload
    pub payload_locator: String,
    /// all trustees the shares were cut for
    pub trustees: Vec<TrusteeId>,
    /// trustees that acknowledged receipt
    pub acked: Vec<TrusteeId>,
    /// shares not yet delivered to their trustee; kept so a trustee
    /// outage at seal time can be retried later, erased as acks arrive
    pub pending_shares: Vec<KeyShare>,
}

impl StoredEscrow {
    /// reconstruction may only be attempted once enough trustees hold
    /// their shares
    pub fn distribution_complete(&self) -> bool {
        self.acked.len() >= self.sealed.threshold as usize
    }
}

pub struct EscrowRegistry {
    escrows: sled::Tree,
    bindings: sled::Tree,
}

impl EscrowRegistry {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(EscrowRegistry {
            escrows: db.open_tree("escrows")?,
            bindings: db.open_tree("bindings")?,
        })
    }

    /// store a freshly sealed escrow
    ///
    /// one escrow per identity: re-sealing an identity that already has
    /// one is rejected, a new payload for the same borrower is a policy
    /// decision this backend does not take.
    pub fn put_escrow(&self, escrow: &StoredEscrow) -> Result<()> {
        let key = escrow.sealed.identity_commitment.as_bytes();
        if self.escrows.get(key)?.is_some() {
            return Err(Error::EscrowExists);
        }
        self.escrows.insert(key, serde_json::to_vec(escrow)?)?;
        Ok(())
    }

    pub fn get_escrow(&self, identity: &IdentityCommitment) -> Result<Option<StoredEscrow>> {
        match self.escrows.get(identity.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// record a trustee acknowledgement and drop its undelivered share
    pub fn mark_acked(&self, identity: &IdentityCommitment, trustee: &TrusteeId) -> Result<()> {
        let mut escrow = self
            .get_escrow(identity)?
            .ok_or(Error::BindingUnverifiable)?;
        let pending_before = escrow.pending_shares.len();
        escrow.pending_shares.retain(|s| &s.trustee != trustee);
        if escrow.acked.contains(trustee) && escrow.pending_shares.len() == pending_before {
            return Ok(());
        }
        if !escrow.acked.contains(trustee) {
            escrow.acked.push(trustee.clone());
        }
        self.escrows
            .insert(identity.as_bytes(), serde_json::to_vec(&escrow)?)?;
        Ok(())
    }

    /// register a borrower's binding from activity to identity commitment
    pub fn put_binding(&self, record: &BindingRecord) -> Result<()> {
        self.bindings.insert(
            record.activity_commitment.as_bytes(),
            serde_json::to_vec(record)?,
        )?;
        Ok(())
    }

    pub fn get_binding(&self, activity: &ActivityCommitment) -> Result<Option<BindingRecord>> {
        match self.bindings.get(activity.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// all activity commitments bound to one identity
    pub fn bindings_for_identity(
        &self,
        identity: &IdentityCommitment,
    ) -> Result<Vec<ActivityCommitment>> {
        let mut out = Vec::new();
        for item in self.bindings.iter() {
            let (_, value) = item?;
            let record: BindingRecord = serde_json::from_slice(&value)?;
            if record.identity_commitment == *identity {
                out.push(record.activity_commitment);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{
        derive_activity_commitment, derive_identity_commitment, BorrowerSecret,
    };
    use crate::escrow;

    fn setup(dir: &tempfile::TempDir) -> (EscrowRegistry, IdentityCommitment, StoredEscrow) {
        let db = sled::open(dir.path()).unwrap();
        let registry = EscrowRegistry::open(&db).unwrap();

        let secret = BorrowerSecret::from_bytes([6u8; 32]);
        let identity = derive_identity_commitment(&secret, b"wallet").unwrap();
        let trustees: Vec<TrusteeId> = (1..=3).map(|i| format!("t{}", i)).collect();
        let (sealed, _, shares) = escrow::seal(b"payload", &identity, &trustees, 2).unwrap();

        let stored = StoredEscrow {
            sealed,
            payload_locator: "abc123".into(),
            trustees,
            acked: Vec::new(),
            pending_shares: shares,
        };
        (registry, identity, stored)
    }

    #[test]
    fn test_one_escrow_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, identity, stored) = setup(&dir);

        registry.put_escrow(&stored).unwrap();
        assert!(matches!(
            registry.put_escrow(&stored),
            Err(Error::EscrowExists)
        ));
        assert!(registry.get_escrow(&identity).unwrap().is_some());
    }

    #[test]
    fn test_ack_tracking_gates_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, identity, stored) = setup(&dir);
        registry.put_escrow(&stored).unwrap();

        assert!(!registry
            .get_escrow(&identity)
            .unwrap()
            .unwrap()
            .distribution_complete());

        registry.mark_acked(&identity, &"t1".to_string()).unwrap();
        registry.mark_acked(&identity, &"t1".to_string()).unwrap(); // idempotent
        assert!(!registry
            .get_escrow(&identity)
            .unwrap()
            .unwrap()
            .distribution_complete());

        registry.mark_acked(&identity, &"t2".to_string()).unwrap();
        let escrow = registry.get_escrow(&identity).unwrap().unwrap();
        assert_eq!(escrow.acked.len(), 2);
        assert!(escrow.distribution_complete());

        // acked trustees' undelivered copies are erased, t3's remains
        assert_eq!(escrow.pending_shares.len(), 1);
        assert_eq!(escrow.pending_shares[0].trustee, "t3");
    }

    #[test]
    fn test_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, identity, _) = setup(&dir);

        let secret = BorrowerSecret::from_bytes([6u8; 32]);
        let a1 = derive_activity_commitment(&secret, 700, &[1u8; 32]).unwrap();
        let a2 = derive_activity_commitment(&secret, 710, &[2u8; 32]).unwrap();

        registry
            .put_binding(&BindingRecord::create(&secret, &identity, &a1))
            .unwrap();
        registry
            .put_binding(&BindingRecord::create(&secret, &identity, &a2))
            .unwrap();

        let record = registry.get_binding(&a1).unwrap().unwrap();
        assert_eq!(record.identity_commitment, identity);

        let mine = registry.bindings_for_identity(&identity).unwrap();
        assert_eq!(mine.len(), 2);
    }
}
