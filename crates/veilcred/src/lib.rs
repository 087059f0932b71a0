//! # veilcred
//!
//! commitment-and-escrow core for privacy-preserving credit.
//!
//! a borrower proves, via an external zk backend, that an on-chain activity
//! metric exceeds a lender's threshold. their identity stays sealed in
//! threshold escrow and is reconstructed only after a verified default.
//!
//! ## architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐
//! │ borrower zk  │────▶│ activity        │
//! │ client       │     │ commitment      │
//! └──────┬───────┘     └────────┬────────┘
//!        │ seal                 │ record
//!        ▼                      ▼
//! ┌──────────────┐     ┌─────────────────┐     ┌────────────┐
//! │ escrow       │     │ commitment      │────▶│ ledger     │
//! │ (t-of-n      │     │ index           │     │ (point     │
//! │  shamir)     │     │ (discovery)     │     │  lookups)  │
//! └──────┬───────┘     └─────────────────┘     └─────┬──────┘
//!        │ shares                                    │
//!    ┌───┴───┬───────┐                               │
//!    ▼       ▼       ▼                               ▼
//!  ┌───┐   ┌───┐   ┌───┐     ┌───────────┐    ┌───────────┐
//!  │ T │   │ T │   │ T │────▶│ disclosure│◀───│ dispute   │
//!  │ 1 │   │ 2 │   │ n │     │orchestrator│   │ scheduler │
//!  └───┘   └───┘   └───┘     └───────────┘    └───────────┘
//! ```
//!
//! ## security properties
//!
//! - identity and activity commitments are unlinkable without the
//!   borrower secret
//! - fewer than `t` key shares reveal nothing about the escrow key
//! - tampered shares and wrong keys are detected before decryption
//! - disclosure eligibility is always recomputed from ledger state; a
//!   lost timer delays a reveal but never produces a wrong one

pub mod commitment;
pub mod error;
pub mod escrow;
pub mod field;
pub mod index;
pub mod ledger;
pub mod registry;
pub mod reveal;
pub mod scheduler;
pub mod shamir;
pub mod store;
pub mod trustee;

pub use commitment::{ActivityCommitment, BorrowerSecret, IdentityCommitment};
pub use error::{Error, Result};
pub use escrow::{seal, unseal, EncryptedIdentityPayload, IdentityPayload, KeyShare, SealedIdentity};
pub use field::FieldScalar;
pub use index::CommitmentIndex;
pub use ledger::{Ledger, LoanApplication, LoanId, LoanStatus, LoanTerms, MemoryLedger};
pub use registry::EscrowRegistry;
pub use reveal::{Disclosure, Orchestrator};
pub use scheduler::{DisputeScheduler, DisputeWindowTask};
pub use store::{MemoryPayloadStore, PayloadStore, SledPayloadStore};
pub use trustee::{LocalTrustees, TrusteeAck, TrusteeChannel, TrusteeId};
