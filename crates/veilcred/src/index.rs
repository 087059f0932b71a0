//! commitment discovery index
//!
//! the ledger only supports point lookups, so finding "all applications
//! for loan X" means testing every commitment the backend has ever
//! observed against `(loan_id, commitment)`. this index is the local,
//! durable record of observed commitments that guides that scan.
//!
//! correctness guarantee: once a commitment is recorded it is visible to
//! every subsequent scan, and a true positive is always found. the flip
//! side is documented and inherent: a commitment the backend never
//! observed is undiscoverable by this mechanism.
//!
//! cost: a discovery call is O(|index|) ledger round-trips. non-matches
//! are cached per `(loan_id, commitment)` with a short ttl so refreshes
//! do not re-query stable negatives every time.

use crate::commitment::ActivityCommitment;
use crate::ledger::{Ledger, LoanApplication, LoanId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// default lifetime of a cached negative lookup
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// one observed commitment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    pub commitment: ActivityCommitment,
    pub first_seen_at: u64,
    pub loan_ids_tested: Vec<LoanId>,
}

/// durable, append-only index of observed commitments
pub struct CommitmentIndex {
    tree: sled::Tree,
    negative: Mutex<HashMap<(LoanId, [u8; 32]), Instant>>,
    negative_ttl: Duration,
}

impl CommitmentIndex {
    pub fn open(db: &sled::Db, negative_ttl: Duration) -> Result<Self> {
        Ok(CommitmentIndex {
            tree: db.open_tree("commitments")?,
            negative: Mutex::new(HashMap::new()),
            negative_ttl,
        })
    }

    /// record an observed commitment; append-only, a second record of the
    /// same commitment is a no-op
    ///
    /// returns true if the commitment was new. the sled insert makes the
    /// commitment visible to every scan that starts after this returns.
    pub fn record(&self, commitment: &ActivityCommitment, now_unix: u64) -> Result<bool> {
        let key = commitment.as_bytes();
        if self.tree.get(key)?.is_some() {
            return Ok(false);
        }
        let entry = IndexEntry {
            commitment: *commitment,
            first_seen_at: now_unix,
            loan_ids_tested: Vec::new(),
        };
        self.tree.insert(key, serde_json::to_vec(&entry)?)?;
        tracing::debug!("recorded commitment {}", commitment.to_hex());
        Ok(true)
    }

    pub fn contains(&self, commitment: &ActivityCommitment) -> Result<bool> {
        Ok(self.tree.get(commitment.as_bytes())?.is_some())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// all observed commitments
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        let mut out = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// discover every known application for a loan
    ///
    /// one ledger point lookup per non-cached commitment. no index lock is
    /// held while awaiting the ledger.
    pub async fn discover_applications<L: Ledger>(
        &self,
        ledger: &L,
        loan_id: LoanId,
    ) -> Result<Vec<LoanApplication>> {
        let entries = self.entries()?;
        let skip = self.fresh_negatives(loan_id);

        let mut found = Vec::new();
        let mut misses = Vec::new();

        for entry in &entries {
            let key = *entry.commitment.as_bytes();
            if skip.contains(&key) {
                continue;
            }
            match ledger.get(loan_id, &entry.commitment).await? {
                Some(app) => {
                    self.mark_tested(&entry.commitment, loan_id)?;
                    found.push(app);
                }
                None => misses.push(key),
            }
        }

        let now = Instant::now();
        let mut negative = self.negative.lock().expect("lock poisoned");
        for key in misses {
            negative.insert((loan_id, key), now);
        }

        tracing::debug!(
            "discovery for loan {}: {} of {} commitments matched",
            loan_id,
            found.len(),
            entries.len()
        );
        Ok(found)
    }

    /// scan a borrower's own commitments over a bounded window of recently
    /// active loans
    ///
    /// the caller supplies both sides of the product: the commitments
    /// bound to the borrower's identity and the loan ids worth testing.
    /// never an unbounded scan.
    pub async fn discover_by_identity<L: Ledger>(
        &self,
        ledger: &L,
        commitments: &[ActivityCommitment],
        loan_window: &[LoanId],
    ) -> Result<Vec<LoanApplication>> {
        let mut found = Vec::new();
        let mut misses = Vec::new();

        for &loan_id in loan_window {
            let skip = self.fresh_negatives(loan_id);
            for commitment in commitments {
                let key = *commitment.as_bytes();
                if skip.contains(&key) {
                    continue;
                }
                match ledger.get(loan_id, commitment).await? {
                    Some(app) => found.push(app),
                    None => misses.push((loan_id, key)),
                }
            }
        }

        let now = Instant::now();
        let mut negative = self.negative.lock().expect("lock poisoned");
        for key in misses {
            negative.insert(key, now);
        }

        Ok(found)
    }

    /// unexpired negative-cache entries for a loan; prunes expired ones
    fn fresh_negatives(&self, loan_id: LoanId) -> HashSet<[u8; 32]> {
        let mut negative = self.negative.lock().expect("lock poisoned");
        let ttl = self.negative_ttl;
        negative.retain(|_, inserted| inserted.elapsed() < ttl);
        negative
            .keys()
            .filter(|(l, _)| *l == loan_id)
            .map(|(_, c)| *c)
            .collect()
    }

    fn mark_tested(&self, commitment: &ActivityCommitment, loan_id: LoanId) -> Result<()> {
        if let Some(value) = self.tree.get(commitment.as_bytes())? {
            let mut entry: IndexEntry = serde_json::from_slice(&value)?;
            if !entry.loan_ids_tested.contains(&loan_id) {
                entry.loan_ids_tested.push(loan_id);
                self.tree
                    .insert(commitment.as_bytes(), serde_json::to_vec(&entry)?)?;
            }
        }
        Ok(())
    }
}
