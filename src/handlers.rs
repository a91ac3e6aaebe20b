// src/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::require_permission;
use crate::error::ApiResult;
use crate::models::DashboardStats;
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub fn normalize(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

// ==================== DASHBOARD ====================

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;

    let total_racks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM racks")
        .fetch_one(pool)
        .await?;
    let total_boxes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes")
        .fetch_one(pool)
        .await?;
    let open_boxes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE status = 'open'")
        .fetch_one(pool)
        .await?;
    let total_patients: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patient_records")
        .fetch_one(pool)
        .await?;
    let assigned_files: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM patient_records WHERE box_id IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let pending_requests: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM file_requests WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    let movements_today: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM movement_logs WHERE date(created_at) = date('now')",
    )
    .fetch_one(pool)
    .await?;

    let stats = DashboardStats {
        total_racks: total_racks.0,
        total_boxes: total_boxes.0,
        open_boxes: open_boxes.0,
        total_patients: total_patients.0,
        assigned_files: assigned_files.0,
        unassigned_files: total_patients.0 - assigned_files.0,
        pending_requests: pending_requests.0,
        movements_today: movements_today.0,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

// ==================== RECENT ACTIVITY ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn get_recent_activity(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LimitQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, |role| role.can_view_audit_log())?;
    let limit = query.normalize(50, 200);

    let entries: Vec<ActivityEntry> = sqlx::query_as(
        r#"SELECT id, user_id, action, entity_type, entity_id, description, created_at
           FROM audit_logs ORDER BY created_at DESC LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(entries)))
}
