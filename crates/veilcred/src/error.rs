//! error types for veilcred

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === field codec errors ===
    #[error("reduced value does not fit the scalar field")]
    FieldOverflow,

    #[error("invalid scalar encoding")]
    InvalidScalar,

    // === escrow errors ===
    #[error("insufficient trustees: have {have}, need {need}")]
    InsufficientTrustees { have: usize, need: usize },

    #[error("not enough shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("share integrity check failed")]
    ShareIntegrityFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid share format")]
    InvalidShareFormat,

    #[error("escrow already sealed for this identity")]
    EscrowExists,

    #[error("share distribution pending: {acks} of {need} acknowledgements")]
    DistributionPending { acks: usize, need: usize },

    // === reveal errors ===
    #[error("application not found")]
    NotFound,

    #[error("application is not in approved state")]
    NotApproved,

    #[error("repayment deadline not passed, {remaining_secs}s remaining")]
    NotOverdue { remaining_secs: u64 },

    #[error("activity commitment cannot be tied to a sealed identity")]
    BindingUnverifiable,

    // === external collaborator errors ===
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("trustee channel error: {0}")]
    Trustee(String),

    #[error("payload store error: {0}")]
    Payload(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
