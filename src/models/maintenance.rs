use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewMaintenance,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewMaintenance {
    pub kind: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_mileage: Option<u32>,
    #[serde(default)]
    pub completed_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed_mileage: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
}

/// Where a maintenance record stands relative to today and the odometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueState {
    Done,
    Overdue { by_date: bool, by_mileage: bool },
    Upcoming,
}

impl NewMaintenance {
    pub fn normalized(mut self) -> Self {
        self.kind = self.kind.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }

    pub fn due_state(&self, today: NaiveDate, current_mileage: Option<u32>) -> DueState {
        if self.done {
            return DueState::Done;
        }
        let by_date = self.due_date.is_some_and(|due| due <= today);
        let by_mileage = matches!(
            (self.due_mileage, current_mileage),
            (Some(due), Some(current)) if due <= current
        );
        if by_date || by_mileage {
            DueState::Overdue {
                by_date,
                by_mileage,
            }
        } else {
            DueState::Upcoming
        }
    }
}

impl DueState {
    pub fn label(&self) -> &'static str {
        match self {
            DueState::Done => "done",
            DueState::Overdue {
                by_date: true,
                by_mileage: true,
            } => "overdue (date and mileage)",
            DueState::Overdue { by_date: true, .. } => "overdue (date)",
            DueState::Overdue { .. } => "overdue (mileage)",
            DueState::Upcoming => "upcoming",
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, DueState::Overdue { .. })
    }
}
