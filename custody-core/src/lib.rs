//! # custody-core
//!
//! Custody state machine for tracked shipments.
//!
//! This crate provides:
//! - Shipment record state and its invariants
//! - The fixed, linear status order and the transition engine over it
//! - Caller authorization (single fixed owner, substitutable policy)
//! - Transition events and the substrate boundary they commit through

pub mod access;
pub mod engine;
pub mod error;
pub mod event;
pub mod record;
pub mod status;
pub mod substrate;

pub use access::{AccessPolicy, SingleOwner};
pub use engine::TransitionEngine;
pub use error::{EngineError, SubstrateError};
pub use event::{EventIdentity, EventKind, PackageId, TransitionEvent};
pub use record::{NewShipment, ShipmentRecord};
pub use status::ShipmentStatus;
pub use substrate::{Commit, Committed, Substrate, TxContext};
