// src/models/hospital.rs
//! Hospitals served by the warehouse. The prefix feeds generated box
//! labels (`{prefix}-{category}-{sequence}`).

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

lazy_static! {
    pub static ref PREFIX_RE: Regex = Regex::new(r"^[A-Z]{2,6}$").unwrap();
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHospitalRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(regex(path = *PREFIX_RE, message = "Prefix must be 2-6 uppercase letters"))]
    pub prefix: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHospitalRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
}
