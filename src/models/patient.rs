// src/models/patient.rs
//! Patient file records. UHID is the permanent per-person identity,
//! MRD is the per-admission file number and may change on re-admission.
//! `box_id` is the single nullable back-pointer to physical storage.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

lazy_static! {
    pub static ref UHID_RE: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9-]{3,31}$").unwrap();
    pub static ref MRD_RE: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9/-]{2,31}$").unwrap();
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PatientRecord {
    pub id: i64,
    pub uhid: String,
    pub mrd: String,
    pub name: String,
    pub hospital_id: Option<String>,
    /// NULL means unassigned / digital-only
    pub box_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Search hit with the resolved physical location
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LocatorHit {
    pub record_id: i64,
    pub name: String,
    pub uhid: String,
    pub mrd: String,
    pub aisle: i64,
    pub rack_label: String,
    pub box_label: String,
    pub box_id: String,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterPatientRequest {
    #[validate(regex(path = *UHID_RE, message = "UHID must be 4-32 uppercase alphanumeric characters"))]
    pub uhid: String,

    #[validate(regex(path = *MRD_RE, message = "MRD must be 3-32 uppercase alphanumeric characters"))]
    pub mrd: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    pub hospital_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePatientRequest {
    /// New admission, new MRD; UHID never changes
    #[validate(regex(path = *MRD_RE, message = "MRD must be 3-32 uppercase alphanumeric characters"))]
    pub mrd: Option<String>,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    pub hospital_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uhid_pattern() {
        assert!(UHID_RE.is_match("UHID123"));
        assert!(UHID_RE.is_match("GH-2024-0042"));
        assert!(!UHID_RE.is_match("ab"));
        assert!(!UHID_RE.is_match("lowercase"));
    }

    #[test]
    fn test_mrd_pattern() {
        assert!(MRD_RE.is_match("MRD001"));
        assert!(MRD_RE.is_match("2024/IPD/17"));
        assert!(!MRD_RE.is_match("x"));
    }
}
