use crate::types::{AccountId, RequestId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("request {0} not found")]
    UnknownRequest(RequestId),

    #[error("request {0}: already fulfilled")]
    AlreadyFulfilled(RequestId),

    #[error("request {0}: no response yet")]
    NotYetFulfilled(RequestId),

    #[error("bad nonce for {account}: expected {expected}, got {got}")]
    BadNonce {
        account: AccountId,
        expected: u64,
        got: u64,
    },

    #[error("journal corrupt at sequence {sequence}: {reason}")]
    Corrupt { sequence: u64, reason: String },

    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),

    #[error("inclusion task aborted: {0}")]
    Aborted(String),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
