//! ledger seam: an opaque key-value store with point lookups
//!
//! the ledger owns loan applications; the backend only reads. there is no
//! enumeration primitive, so "list applications for a loan" is always a
//! local-index-guided scan of point lookups (see [`crate::index`]).

use crate::commitment::ActivityCommitment;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub type LoanId = u64;

/// application lifecycle on the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Repaid,
}

/// a loan application, keyed by `(loan_id, activity_commitment)`
///
/// owned by the ledger; anything the backend holds is a read-through
/// mirror, never the source of truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub loan_id: LoanId,
    pub activity_commitment: ActivityCommitment,
    /// ledger-visible wallet address
    pub borrower_wallet: String,
    pub status: LoanStatus,
    pub applied_at: u64,
    pub approved_at: Option<u64>,
    pub repayment_deadline: Option<u64>,
}

/// terms of a posted loan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub loan_id: LoanId,
    pub principal: u64,
    pub created_at: u64,
    /// seconds after approval before a default becomes disclosable
    pub dispute_window_secs: u64,
}

/// read-only view of the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// point lookup for one application
    async fn get(
        &self,
        loan_id: LoanId,
        commitment: &ActivityCommitment,
    ) -> Result<Option<LoanApplication>>;

    /// loan terms lookup
    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<LoanTerms>>;

    /// the ledger's monotonic clock, unix seconds
    async fn now(&self) -> Result<u64>;
}

/// in-process ledger for tests and dev deployments
#[derive(Default)]
pub struct MemoryLedger {
    applications: Mutex<HashMap<(LoanId, [u8; 32]), LoanApplication>>,
    loans: Mutex<HashMap<LoanId, LoanTerms>>,
    clock: AtomicU64,
    lookups: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_loan(&self, terms: LoanTerms) {
        self.loans
            .lock()
            .expect("lock poisoned")
            .insert(terms.loan_id, terms);
    }

    pub fn submit_application(&self, app: LoanApplication) {
        let key = (app.loan_id, *app.activity_commitment.as_bytes());
        self.applications
            .lock()
            .expect("lock poisoned")
            .insert(key, app);
    }

    pub fn approve(&self, loan_id: LoanId, commitment: &ActivityCommitment, deadline: u64) {
        let mut apps = self.applications.lock().expect("lock poisoned");
        if let Some(app) = apps.get_mut(&(loan_id, *commitment.as_bytes())) {
            app.status = LoanStatus::Approved;
            app.approved_at = Some(self.clock.load(Ordering::SeqCst));
            app.repayment_deadline = Some(deadline);
        }
    }

    pub fn repay(&self, loan_id: LoanId, commitment: &ActivityCommitment) {
        let mut apps = self.applications.lock().expect("lock poisoned");
        if let Some(app) = apps.get_mut(&(loan_id, *commitment.as_bytes())) {
            app.status = LoanStatus::Repaid;
        }
    }

    /// advance the ledger clock
    pub fn set_now(&self, unix_secs: u64) {
        self.clock.store(unix_secs, Ordering::SeqCst);
    }

    /// number of point lookups served, for cost assertions in tests
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get(
        &self,
        loan_id: LoanId,
        commitment: &ActivityCommitment,
    ) -> Result<Option<LoanApplication>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .applications
            .lock()
            .expect("lock poisoned")
            .get(&(loan_id, *commitment.as_bytes()))
            .cloned())
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<LoanTerms>> {
        Ok(self
            .loans
            .lock()
            .expect("lock poisoned")
            .get(&loan_id)
            .cloned())
    }

    async fn now(&self) -> Result<u64> {
        Ok(self.clock.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{derive_activity_commitment, BorrowerSecret};

    fn commitment(n: u8) -> ActivityCommitment {
        let secret = BorrowerSecret::from_bytes([n; 32]);
        derive_activity_commitment(&secret, 700, &[n; 32]).unwrap()
    }

    #[tokio::test]
    async fn test_point_lookup() {
        let ledger = MemoryLedger::new();
        let c = commitment(1);

        assert!(ledger.get(1, &c).await.unwrap().is_none());

        ledger.submit_application(LoanApplication {
            loan_id: 1,
            activity_commitment: c,
            borrower_wallet: "0xabc".into(),
            status: LoanStatus::Pending,
            applied_at: 100,
            approved_at: None,
            repayment_deadline: None,
        });

        let app = ledger.get(1, &c).await.unwrap().unwrap();
        assert_eq!(app.status, LoanStatus::Pending);
        assert_eq!(ledger.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let ledger = MemoryLedger::new();
        let c = commitment(2);
        ledger.set_now(1_000);

        ledger.submit_application(LoanApplication {
            loan_id: 7,
            activity_commitment: c,
            borrower_wallet: "0xdef".into(),
            status: LoanStatus::Pending,
            applied_at: 1_000,
            approved_at: None,
            repayment_deadline: None,
        });

        ledger.approve(7, &c, 1_600);
        let app = ledger.get(7, &c).await.unwrap().unwrap();
        assert_eq!(app.status, LoanStatus::Approved);
        assert_eq!(app.repayment_deadline, Some(1_600));

        ledger.repay(7, &c);
        let app = ledger.get(7, &c).await.unwrap().unwrap();
        assert_eq!(app.status, LoanStatus::Repaid);
    }
}
