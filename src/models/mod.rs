// src/models/mod.rs

pub mod assignment;
pub mod file_request;
pub mod hospital;
pub mod movement;
pub mod patient;
pub mod rack;
pub mod storage_box;

// Re-export so structs are reachable as crate::models::StructName
pub use assignment::*;
pub use file_request::*;
pub use hospital::*;
pub use movement::*;
pub use patient::*;
pub use rack::*;
pub use storage_box::*;

use serde::{Deserialize, Serialize};

// ==================== COMMON / SHARED ====================

/// Search query parameters
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

/// Aggregate dashboard counters
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_racks: i64,
    pub total_boxes: i64,
    pub open_boxes: i64,
    pub total_patients: i64,
    pub assigned_files: i64,
    pub unassigned_files: i64,
    pub pending_requests: i64,
    pub movements_today: i64,
}
