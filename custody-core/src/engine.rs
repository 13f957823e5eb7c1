//! Transition engine - the custody state machine.
//!
//! Every mutating operation follows the same shape: authorize the caller,
//! then hand the substrate one closure that checks the status precondition,
//! validates inputs, and produces the post-state record paired with exactly
//! one event. A failed step aborts the transaction with nothing applied.

use crate::access::AccessPolicy;
use crate::error::EngineError;
use crate::event::{EventKind, PackageId, TransitionEvent};
use crate::record::{NewShipment, ShipmentRecord};
use crate::status::ShipmentStatus;
use crate::substrate::{Commit, Committed, Substrate};
use std::sync::Arc;

/// The custody state machine over one substrate.
pub struct TransitionEngine<S, P> {
    substrate: Arc<S>,
    policy: P,
}

impl<S: Substrate, P: AccessPolicy> TransitionEngine<S, P> {
    pub fn new(substrate: Arc<S>, policy: P) -> Self {
        Self { substrate, policy }
    }

    /// Returns the substrate this engine commits through.
    pub fn substrate(&self) -> &Arc<S> {
        &self.substrate
    }

    /// Creates a shipment record owned by the caller.
    pub fn create(&self, caller: &str, details: NewShipment) -> Result<ShipmentRecord, EngineError> {
        self.policy.authorize(caller)?;
        let record = ShipmentRecord::new(caller, details)?;
        self.substrate.create(record.clone())?;
        tracing::info!(package_id = %record.package_id(), owner = caller, "shipment record created");
        Ok(record)
    }

    /// Hands the package to a carrier custodian: `Created -> Departed`.
    pub fn depart(
        &self,
        caller: &str,
        package_id: &PackageId,
        custodian: &str,
        value: u64,
    ) -> Result<Committed, EngineError> {
        self.transition(
            caller,
            package_id,
            EventKind::Departed,
            ShipmentStatus::Departed,
            &[ShipmentStatus::Created],
            None,
            Some(custodian),
            value,
        )
    }

    /// Marks the package as moving between waypoints: `Departed -> InTransit`.
    pub fn mark_in_transit(
        &self,
        caller: &str,
        package_id: &PackageId,
        location: &str,
    ) -> Result<Committed, EngineError> {
        self.transition(
            caller,
            package_id,
            EventKind::InTransit,
            ShipmentStatus::InTransit,
            &[ShipmentStatus::Departed],
            Some(location),
            None,
            0,
        )
    }

    /// Records arrival at a waypoint: `Departed | InTransit -> Arrived`.
    pub fn arrive(
        &self,
        caller: &str,
        package_id: &PackageId,
        location: &str,
        custodian: &str,
        value: u64,
    ) -> Result<Committed, EngineError> {
        self.transition(
            caller,
            package_id,
            EventKind::Arrived,
            ShipmentStatus::Arrived,
            &[ShipmentStatus::Departed, ShipmentStatus::InTransit],
            Some(location),
            Some(custodian),
            value,
        )
    }

    /// Hands the package to the recipient: `Arrived -> Delivered`. Terminal.
    pub fn deliver(
        &self,
        caller: &str,
        package_id: &PackageId,
        location: &str,
        custodian: &str,
        value: u64,
    ) -> Result<Committed, EngineError> {
        self.transition(
            caller,
            package_id,
            EventKind::Delivered,
            ShipmentStatus::Delivered,
            &[ShipmentStatus::Arrived],
            Some(location),
            Some(custodian),
            value,
        )
    }

    /// Reads the current committed state of a record.
    pub fn details(&self, package_id: &PackageId) -> Result<ShipmentRecord, EngineError> {
        Ok(self.substrate.read(package_id)?)
    }

    #[allow(clippy::too_many_arguments)]
    fn transition(
        &self,
        caller: &str,
        package_id: &PackageId,
        kind: EventKind,
        new_status: ShipmentStatus,
        allowed_from: &[ShipmentStatus],
        location: Option<&str>,
        custodian: Option<&str>,
        fee: u64,
    ) -> Result<Committed, EngineError> {
        self.policy.authorize(caller)?;

        let committed = self.substrate.transact(package_id, |record, ctx| {
            // The ordering guarantee: the current status must be exactly a
            // required predecessor, so no operation can repeat, skip ahead,
            // or touch a terminal record.
            if !allowed_from.contains(&record.status()) {
                return Err(EngineError::InvalidTransition {
                    from: record.status(),
                    to: new_status,
                });
            }

            let mut next = record.clone();
            next.apply_transition(new_status, location, custodian, ctx)?;

            let event = TransitionEvent {
                kind,
                package_id: package_id.clone(),
                previous_status: record.status(),
                new_status,
                location: next.current_location().to_string(),
                custodian: next.custodian().to_string(),
                timestamp: ctx.timestamp,
                transaction_ref: ctx.transaction_ref,
            };

            Ok(Commit {
                record: next,
                event,
                fee,
            })
        })?;

        tracing::info!(
            package_id = %package_id,
            kind = %kind,
            from = %committed.event.previous_status,
            to = %new_status,
            sequence = committed.sequence,
            "custody transition committed"
        );

        Ok(committed)
    }
}
