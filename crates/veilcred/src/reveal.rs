//! disclosure orchestrator
//!
//! answers one question: may this application's identity be revealed, and
//! if so, with what plaintext? every check runs against live ledger state
//! at call time, never against cached approval or a timer's opinion.
//! all failures are terminal for the call, there is no partial reveal.

use crate::commitment::{self, ActivityCommitment, BindingRecord, IdentityCommitment};
use crate::escrow::{self, EncryptedIdentityPayload, IdentityPayload};
use crate::ledger::{Ledger, LoanApplication, LoanId, LoanStatus};
use crate::registry::{EscrowRegistry, StoredEscrow};
use crate::scheduler::DisputeWindowTask;
use crate::store::PayloadStore;
use crate::trustee::{self, TrusteeChannel, TrusteeId};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// bounded backoff for ledger lookups; cryptographic failures are never
/// retried
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// the revealed identity, returned only after every gate passed
#[derive(Clone, Debug)]
pub struct Disclosure {
    pub payload: IdentityPayload,
    pub borrower_wallet: String,
    pub identity_commitment: IdentityCommitment,
}

/// receipt for a completed seal operation
#[derive(Clone, Debug, Serialize)]
pub struct SealReceipt {
    pub escrow_id: [u8; 32],
    pub payload_locator: String,
    pub acks: usize,
    pub threshold: u8,
    pub distribution_complete: bool,
}

pub struct Orchestrator<L, T, P> {
    ledger: Arc<L>,
    trustees: Arc<T>,
    payloads: Arc<P>,
    registry: Arc<EscrowRegistry>,
    retry: RetryPolicy,
    share_timeout: Duration,
}

impl<L: Ledger, T: TrusteeChannel, P: PayloadStore> Orchestrator<L, T, P> {
    pub fn new(
        ledger: Arc<L>,
        trustees: Arc<T>,
        payloads: Arc<P>,
        registry: Arc<EscrowRegistry>,
    ) -> Self {
        Orchestrator {
            ledger,
            trustees,
            payloads,
            registry,
            retry: RetryPolicy::default(),
            share_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_share_timeout(mut self, timeout: Duration) -> Self {
        self.share_timeout = timeout;
        self
    }

    /// seal an identity payload and distribute key shares to trustees
    ///
    /// the ciphertext goes to the content-addressed store; only escrow
    /// metadata and the distribution state are kept locally.
    pub async fn seal_identity(
        &self,
        payload: &IdentityPayload,
        identity: &IdentityCommitment,
        trustees: &[TrusteeId],
        threshold: u8,
    ) -> Result<SealReceipt> {
        if self.registry.get_escrow(identity)?.is_some() {
            return Err(Error::EscrowExists);
        }

        let (sealed, encrypted, shares) =
            escrow::seal(&payload.to_bytes(), identity, trustees, threshold)?;

        let locator = self.payloads.put(&serde_json::to_vec(&encrypted)?).await?;

        let report = trustee::distribute(self.trustees.as_ref(), &shares, threshold).await;
        if !report.failed.is_empty() {
            tracing::warn!(
                "{} of {} trustees did not acknowledge",
                report.failed.len(),
                trustees.len()
            );
        }

        // undelivered shares stay with the escrow so an outage at seal
        // time can be retried through [`redistribute`]
        let acked = report.acked_trustees();
        let pending_shares = shares
            .into_iter()
            .filter(|s| !acked.contains(&s.trustee))
            .collect();
        let stored = StoredEscrow {
            sealed: sealed.clone(),
            payload_locator: locator.clone(),
            trustees: trustees.to_vec(),
            acked,
            pending_shares,
        };
        self.registry.put_escrow(&stored)?;

        tracing::info!(
            "sealed escrow {} for identity {} ({} acks)",
            hex::encode(sealed.escrow_id),
            identity.to_hex(),
            report.acks.len()
        );

        Ok(SealReceipt {
            escrow_id: sealed.escrow_id,
            payload_locator: locator,
            acks: report.acks.len(),
            threshold,
            distribution_complete: report.is_complete(),
        })
    }

    /// register a borrower's activity-to-identity binding
    pub fn register_binding(&self, record: &BindingRecord) -> Result<()> {
        self.registry.put_binding(record)
    }

    /// retry delivery of shares that missed their trustee at seal time
    ///
    /// each fresh acknowledgement erases the backend's copy of that
    /// share. pending distribution is therefore a recoverable state: a
    /// trustee outage delays disclosure eligibility, it never strands
    /// the escrow.
    pub async fn redistribute(&self, identity: &IdentityCommitment) -> Result<SealReceipt> {
        let stored = self.registry.get_escrow(identity)?.ok_or(Error::NotFound)?;

        if !stored.pending_shares.is_empty() {
            let report = trustee::distribute(
                self.trustees.as_ref(),
                &stored.pending_shares,
                stored.sealed.threshold,
            )
            .await;
            for ack in &report.acks {
                self.registry.mark_acked(identity, &ack.trustee)?;
            }
            if !report.failed.is_empty() {
                tracing::warn!(
                    "{} trustees still unreachable after redistribution",
                    report.failed.len()
                );
            }
        }

        let stored = self.registry.get_escrow(identity)?.ok_or(Error::NotFound)?;
        Ok(SealReceipt {
            escrow_id: stored.sealed.escrow_id,
            payload_locator: stored.payload_locator.clone(),
            acks: stored.acked.len(),
            threshold: stored.sealed.threshold,
            distribution_complete: stored.distribution_complete(),
        })
    }

    /// attempt to reveal the identity behind an overdue application
    ///
    /// gates, in order: the application exists on the ledger, is approved,
    /// its repayment deadline has passed, the activity commitment ties to
    /// a fully distributed escrow, and enough authentic shares arrive.
    /// only then is the key reconstructed, the payload unsealed, and the
    /// binding cryptographically confirmed.
    pub async fn attempt_reveal(
        &self,
        loan_id: LoanId,
        activity: &ActivityCommitment,
    ) -> Result<Disclosure> {
        // 1. live ledger lookup
        let app = self
            .lookup_with_retry(loan_id, activity)
            .await?
            .ok_or(Error::NotFound)?;

        // 2. pending and repaid applications are never revealable
        if app.status != LoanStatus::Approved {
            return Err(Error::NotApproved);
        }

        // 3. deadline check against ledger time
        let deadline = app.repayment_deadline.ok_or(Error::NotApproved)?;
        let now = self.ledger.now().await?;
        if now <= deadline {
            return Err(Error::NotOverdue {
                remaining_secs: deadline - now,
            });
        }

        // 4. tie the activity commitment to a sealed, distributed escrow
        let binding = self
            .registry
            .get_binding(activity)?
            .ok_or(Error::BindingUnverifiable)?;
        let stored = self
            .registry
            .get_escrow(&binding.identity_commitment)?
            .ok_or(Error::BindingUnverifiable)?;
        if !stored.distribution_complete() {
            return Err(Error::DistributionPending {
                acks: stored.acked.len(),
                need: stored.sealed.threshold as usize,
            });
        }

        let shares = trustee::collect_shares(
            self.trustees.as_ref(),
            &stored.acked,
            &stored.sealed.escrow_id,
            self.share_timeout,
        )
        .await;
        if shares.len() < stored.sealed.threshold as usize {
            return Err(Error::InsufficientShares {
                have: shares.len(),
                need: stored.sealed.threshold as usize,
            });
        }

        // 5. reconstruct, unseal, confirm the binding, disclose
        let encrypted: EncryptedIdentityPayload =
            serde_json::from_slice(&self.payloads.get(&stored.payload_locator).await?)
                .map_err(|_| Error::DecryptionFailed)?;

        let key = escrow::reconstruct(&stored.sealed, &shares)?;
        let plaintext = escrow::unseal(&encrypted, &key);
        drop(key); // zeroed here whether unseal succeeded or not
        let payload = IdentityPayload::from_bytes(&plaintext?)?;

        if !commitment::verify_binding_with_key(
            &payload.binding_key,
            &binding.identity_commitment,
            activity,
            &binding.tag,
        ) {
            return Err(Error::BindingUnverifiable);
        }

        tracing::info!(
            "identity disclosed for loan {} commitment {}",
            loan_id,
            activity.to_hex()
        );

        Ok(Disclosure {
            payload,
            borrower_wallet: app.borrower_wallet,
            identity_commitment: binding.identity_commitment,
        })
    }

    /// dispute-window fire handler
    ///
    /// re-checks everything from the ledger; a task firing for an
    /// application repaid out-of-band is a no-op, not an error.
    pub async fn handle_dispute_fire(&self, task: &DisputeWindowTask) -> Option<Disclosure> {
        match self.attempt_reveal(task.loan_id, &task.commitment).await {
            Ok(disclosure) => Some(disclosure),
            Err(Error::NotApproved) | Err(Error::NotFound) => {
                tracing::info!(
                    "dispute fire for loan {} is a no-op, application repaid or gone",
                    task.loan_id
                );
                None
            }
            Err(Error::NotOverdue { remaining_secs }) => {
                tracing::info!(
                    "dispute fire for loan {} early by {}s, deferring to ledger",
                    task.loan_id,
                    remaining_secs
                );
                None
            }
            Err(e) => {
                tracing::warn!("dispute fire for loan {} failed: {}", task.loan_id, e);
                None
            }
        }
    }

    async fn lookup_with_retry(
        &self,
        loan_id: LoanId,
        activity: &ActivityCommitment,
    ) -> Result<Option<LoanApplication>> {
        let mut backoff = self.retry.initial_backoff;
        let mut last = None;
        for attempt in 0..self.retry.attempts {
            match self.ledger.get(loan_id, activity).await {
                Ok(found) => return Ok(found),
                Err(e @ Error::Ledger(_)) => {
                    tracing::warn!("ledger lookup attempt {} failed: {}", attempt + 1, e);
                    last = Some(e);
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| Error::Ledger("lookup failed".into())))
    }
}
