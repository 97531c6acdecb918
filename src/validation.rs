//! Domain rules checked before any request reaches the backend.
//!
//! Every check runs so callers can list all failures, but forms only show
//! [`ValidationErrors::message`], the first failed rule.

use std::fmt;

use crate::models::{
    invoice::{InvoiceKind, NewInvoice},
    maintenance::NewMaintenance,
    trip::NewTrip,
};

pub const NO_DRIVERS: &str = "Please select at least one driver";
pub const START_AFTER_END: &str = "The start date must not be after the end date";
pub const NEGATIVE_DISTANCE: &str = "The distance must not be negative";
pub const EMPTY_NAME: &str = "Please enter a name";
pub const NON_POSITIVE_AMOUNT: &str = "The amount must be greater than zero";
pub const MISSING_COUNTER_PARTY: &str = "A reimbursement needs a counter-party driver";
pub const SAME_COUNTER_PARTY: &str = "Payer and counter-party must be different drivers";
pub const EMPTY_MAINTENANCE_KIND: &str = "Please enter the kind of maintenance";
pub const MISSING_COMPLETION: &str =
    "A completed maintenance needs a completion date or mileage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<&'static str>);

impl ValidationErrors {
    pub fn message(&self) -> &'static str {
        self.0.first().copied().unwrap_or("Invalid input")
    }

    pub fn all(&self) -> &[&'static str] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Checks(Vec<&'static str>);

impl Checks {
    fn require(&mut self, ok: bool, message: &'static str) -> &mut Self {
        if !ok {
            self.0.push(message);
        }
        self
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

pub fn validate_trip(trip: &NewTrip) -> Result<(), ValidationErrors> {
    let mut checks = Checks::default();
    checks
        .require(!trip.drivers.is_empty(), NO_DRIVERS)
        .require(trip.start_date <= trip.end_date, START_AFTER_END)
        .require(trip.distance.map_or(true, |d| d >= 0.0), NEGATIVE_DISTANCE);
    checks.finish()
}

pub fn validate_invoice(invoice: &NewInvoice) -> Result<(), ValidationErrors> {
    let mut checks = Checks::default();
    checks
        .require(!invoice.name.trim().is_empty(), EMPTY_NAME)
        .require(invoice.amount > 0.0, NON_POSITIVE_AMOUNT);
    if invoice.kind == InvoiceKind::Reimbursement {
        match invoice.counter_party {
            None => {
                checks.require(false, MISSING_COUNTER_PARTY);
            }
            Some(other) => {
                checks.require(other != invoice.driver, SAME_COUNTER_PARTY);
            }
        }
    }
    checks.finish()
}

pub fn validate_maintenance(record: &NewMaintenance) -> Result<(), ValidationErrors> {
    let mut checks = Checks::default();
    checks
        .require(!record.kind.trim().is_empty(), EMPTY_MAINTENANCE_KIND)
        .require(
            !record.done
                || record.completed_date.is_some()
                || record.completed_mileage.is_some(),
            MISSING_COMPLETION,
        );
    checks.finish()
}
