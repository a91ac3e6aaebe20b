// src/models/movement.rs
//! Movement ledger: append-only CHECK-IN / CHECK-OUT audit trail.
//! Entries reference a patient by UHID and a free-text destination and
//! are deliberately independent of box assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum MovementType {
    #[strum(serialize = "CHECK-IN")]
    CheckIn,
    #[strum(serialize = "CHECK-OUT")]
    CheckOut,
}

impl MovementType {
    pub fn is_valid(s: &str) -> bool {
        s.parse::<MovementType>().is_ok()
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct MovementLog {
    pub id: String,
    pub movement_type: String,
    pub uhid: String,
    pub patient_name: String,
    pub destination: String,
    pub status: String,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementRequest {
    /// "CHECK-IN" or "CHECK-OUT"
    #[serde(rename = "type")]
    pub movement_type: String,

    #[validate(length(min = 1, max = 50, message = "UHID must be 1-50 characters"))]
    pub uhid: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 255, message = "Destination must be 1-255 characters"))]
    pub dest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_type_round_trip() {
        assert_eq!(MovementType::CheckIn.to_string(), "CHECK-IN");
        assert_eq!(
            "CHECK-OUT".parse::<MovementType>().unwrap(),
            MovementType::CheckOut
        );
        assert!(!MovementType::is_valid("TRANSFER"));
    }
}
