// src/models/storage_box.rs
//! Storage box: bounded container of patient files inside a rack.
//! Labels follow `{hospitalPrefix}-{category}-{sequence}` and the
//! sequence counter is owned by the server (atomic bump on create).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use validator::Validate;

// ==================== ENUMS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BoxStatus {
    Open,
    Closed,
}

impl BoxStatus {
    pub fn is_valid(s: &str) -> bool {
        s.parse::<BoxStatus>().is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BoxCategory {
    Ipd,
    Opd,
    Mlc,
    Birth,
    Death,
}

impl BoxCategory {
    pub fn is_valid(s: &str) -> bool {
        s.parse::<BoxCategory>().is_ok()
    }

    pub fn valid_values() -> String {
        BoxCategory::iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ==================== STORAGE BOX ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StorageBox {
    pub id: String,
    pub label: String,
    pub rack_id: String,
    pub capacity: i64,
    pub status: String,
    pub category: String,
    pub hospital_id: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageBox {
    pub fn is_open(&self) -> bool {
        self.status == BoxStatus::Open.to_string()
    }
}

/// Box joined with rack location and its live file count
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BoxWithStats {
    pub id: String,
    pub label: String,
    pub rack_id: String,
    pub rack_label: String,
    pub aisle: i64,
    pub capacity: i64,
    pub status: String,
    pub category: String,
    pub hospital_id: String,
    pub patient_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBoxRequest {
    pub rack_id: String,

    /// Server-generated from the hospital prefix and category when omitted
    #[validate(length(min = 1, max = 50, message = "Label must be 1-50 characters"))]
    pub label: Option<String>,

    #[validate(range(min = 1, max = 1000, message = "Capacity must be 1-1000"))]
    pub capacity: i64,

    pub category: String,
    pub hospital_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBoxRequest {
    #[validate(length(min = 1, max = 50, message = "Label must be 1-50 characters"))]
    pub label: Option<String>,

    #[validate(range(min = 1, max = 1000, message = "Capacity must be 1-1000"))]
    pub capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetBoxStatusRequest {
    pub open: bool,
}

#[derive(Debug, Deserialize)]
pub struct BoxFilterQuery {
    pub rack_id: Option<String>,
    pub hospital_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextSequenceQuery {
    pub hospital_id: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct NextSequenceResponse {
    pub full_label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_status_round_trip() {
        assert_eq!(BoxStatus::Open.to_string(), "open");
        assert_eq!("closed".parse::<BoxStatus>().unwrap(), BoxStatus::Closed);
        assert!(BoxStatus::is_valid("open"));
        assert!(!BoxStatus::is_valid("ajar"));
    }

    #[test]
    fn test_box_category_values() {
        assert_eq!(BoxCategory::Ipd.to_string(), "IPD");
        assert!(BoxCategory::is_valid("MLC"));
        assert!(!BoxCategory::is_valid("XRAY"));
        assert_eq!(BoxCategory::valid_values(), "IPD, OPD, MLC, BIRTH, DEATH");
    }
}
