//! Core error types.

use crate::status::ShipmentStatus;
use thiserror::Error;

/// Errors reported to callers of the transition engine.
///
/// Every error is terminal for the attempted operation: nothing is retried
/// inside the engine and no state changes on failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unauthorized: '{caller}' is not the configured owner")]
    Unauthorized { caller: String },

    #[error("invalid transition: cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },

    #[error("invalid argument: {field} must be a non-empty string")]
    InvalidArgument { field: &'static str },

    #[error("substrate failure: {0}")]
    Substrate(#[from] SubstrateError),
}

impl EngineError {
    /// Returns an error code suitable for wire responses and envelopes.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Unauthorized { .. } => "UNAUTHORIZED",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            EngineError::Substrate(_) => "SUBSTRATE_FAILURE",
        }
    }
}

/// Failures of the execution/commit substrate itself.
///
/// The substrate guarantees atomicity, so a failed commit leaves the record
/// and its event log unchanged.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("package not found: {package_id}")]
    PackageNotFound { package_id: String },

    #[error("package already exists: {package_id}")]
    PackageExists { package_id: String },

    #[error("storage failure: {reason}")]
    Storage { reason: String },
}
