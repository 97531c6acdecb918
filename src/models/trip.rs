use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::driver::Driver;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewTrip,
}

/// A trip as submitted by the create form, before the backend assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewTrip {
    /// Trims text fields and drops repeated drivers while keeping their order.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.comment = self
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let mut seen = Vec::with_capacity(self.drivers.len());
        self.drivers.retain(|driver| {
            if seen.contains(driver) {
                false
            } else {
                seen.push(*driver);
                true
            }
        });
        self
    }

    pub fn drivers_text(&self) -> String {
        self.drivers
            .iter()
            .map(|d| d.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn distance_text(&self) -> String {
        self.distance
            .map(|d| format!("{d:.1} km"))
            .unwrap_or_else(|| "–".into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub total_distance: f64,
}
