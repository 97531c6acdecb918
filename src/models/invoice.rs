use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::driver::Driver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceKind {
    Fuel,
    Maintenance,
    Insurance,
    Repair,
    Inspection,
    Other,
    Reimbursement,
}

impl InvoiceKind {
    pub const ALL: [InvoiceKind; 7] = [
        InvoiceKind::Fuel,
        InvoiceKind::Maintenance,
        InvoiceKind::Insurance,
        InvoiceKind::Repair,
        InvoiceKind::Inspection,
        InvoiceKind::Other,
        InvoiceKind::Reimbursement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Fuel => "Fuel",
            InvoiceKind::Maintenance => "Maintenance",
            InvoiceKind::Insurance => "Insurance",
            InvoiceKind::Repair => "Repair",
            InvoiceKind::Inspection => "Inspection",
            InvoiceKind::Other => "Other",
            InvoiceKind::Reimbursement => "Reimbursement",
        }
    }
}

impl fmt::Display for InvoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewInvoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub name: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub kind: InvoiceKind,
    /// The driver who paid.
    pub driver: Driver,
    /// Who the payment was made for. Required for reimbursements.
    #[serde(default)]
    pub counter_party: Option<Driver>,
    #[serde(default)]
    pub mileage: Option<u32>,
    /// File reference handed out by the backend after an upload.
    #[serde(default)]
    pub attachment: Option<String>,
}

impl NewInvoice {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self
    }

    pub fn amount_text(&self) -> String {
        format!("{:.2} €", self.amount)
    }
}

/// A file uploaded together with an invoice form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Total paid by one driver across all invoices, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverTotal {
    pub driver: Driver,
    pub total: f64,
}
