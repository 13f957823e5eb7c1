//! Ledger error types.

use custody_core::SubstrateError;
use thiserror::Error;

/// Errors from the durable journal.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("invalid journal header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, actual {actual:#010x}")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("journal record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<JournalError> for SubstrateError {
    fn from(err: JournalError) -> Self {
        SubstrateError::Storage {
            reason: err.to_string(),
        }
    }
}
