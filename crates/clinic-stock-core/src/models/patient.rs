//! Patient and visit anchor records.
//!
//! Only the fields that visit transactions and deletion cascades need are
//! kept here; full patient records live with the collaborating layer.

use serde::{Deserialize, Serialize};

/// A patient that visit transactions can be attributed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Unique patient ID
    pub id: String,
    pub name: String,
    pub notes: Option<String>,
    pub created_at: String,
}

impl Patient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            notes: None,
            created_at: super::timestamp_now(),
        }
    }
}

/// A clinic visit grouping the medicines handed out to one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    /// Unique visit ID
    pub id: String,
    pub patient_id: String,
    /// Visit date (YYYY-MM-DD)
    pub visit_date: String,
    pub notes: Option<String>,
    pub created_at: String,
}

impl Visit {
    pub fn new(patient_id: impl Into<String>, visit_date: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: patient_id.into(),
            visit_date: visit_date.into(),
            notes: None,
            created_at: super::timestamp_now(),
        }
    }
}
