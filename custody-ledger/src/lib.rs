//! # custody-ledger
//!
//! Reference substrate for custody records.
//!
//! This crate provides:
//! - A durable, checksummed append-only journal with tail recovery
//! - Per-package record slots with serialized commits
//! - Append-only event logs with restartable pull cursors

pub mod error;
pub mod journal;
pub mod ledger;
pub mod log;

pub use error::JournalError;
pub use journal::{Journal, JournalEntry};
pub use ledger::Ledger;
pub use log::{EventCursor, EventLog};
