use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed roster of people sharing the car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Anna,
    Ben,
    Clara,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Anna, Driver::Ben, Driver::Clara];

    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Anna => "anna",
            Driver::Ben => "ben",
            Driver::Clara => "clara",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Driver::Anna => "Anna",
            Driver::Ben => "Ben",
            Driver::Clara => "Clara",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
