// src/models/rack.rs
//! Warehouse rack: shelving unit identified by an aisle number.
//! A rack owns boxes (1:N) and can only be deleted when empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Rack {
    pub id: String,
    pub label: String,
    pub aisle: i64,
    pub capacity: i64,
    /// NULL means the rack is shared between hospitals
    pub hospital_id: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rack with its current box count (for listings)
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RackWithStats {
    pub id: String,
    pub label: String,
    pub aisle: i64,
    pub capacity: i64,
    pub hospital_id: Option<String>,
    pub box_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== WAREHOUSE LAYOUT ====================

/// One box slot inside the layout tree
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LayoutBox {
    pub box_id: String,
    pub box_label: String,
    pub category: String,
    pub status: String,
    pub capacity: i64,
    pub patient_count: i64,
}

/// Rack node of `GET /storage/layout`
#[derive(Debug, Serialize)]
pub struct RackLayout {
    pub rack_id: String,
    pub rack_label: String,
    pub aisle: i64,
    pub capacity: i64,
    pub boxes: Vec<LayoutBox>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRackRequest {
    /// Auto-assigned as `A{aisle}-R{n}` when omitted
    #[validate(length(min = 1, max = 50, message = "Label must be 1-50 characters"))]
    pub label: Option<String>,

    #[validate(range(min = 0, message = "Aisle cannot be negative"))]
    pub aisle: i64,

    #[validate(range(min = 1, max = 10000, message = "Capacity must be 1-10000"))]
    pub capacity: i64,

    pub hospital_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRackRequest {
    #[validate(length(min = 1, max = 50, message = "Label must be 1-50 characters"))]
    pub label: Option<String>,

    #[validate(range(min = 1, max = 10000, message = "Capacity must be 1-10000"))]
    pub capacity: Option<i64>,

    pub hospital_id: Option<String>,
}
