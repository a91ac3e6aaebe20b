// src/hospital_handlers.rs
//! Hospital administration. The prefix is immutable after creation
//! because generated box labels embed it.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateHospitalRequest, Hospital, UpdateHospitalRequest};
use crate::AppState;

// ==================== GET HOSPITALS ====================

pub async fn get_hospitals(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let hospitals: Vec<Hospital> = sqlx::query_as("SELECT * FROM hospitals ORDER BY name ASC")
        .fetch_all(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(hospitals)))
}

// ==================== CREATE HOSPITAL ====================

pub async fn create_hospital(
    app_state: web::Data<Arc<AppState>>,
    hospital: web::Json<CreateHospitalRequest>,
) -> ApiResult<HttpResponse> {
    hospital.validate()?;
    let pool = &app_state.db_pool;

    let name = hospital.name.trim();
    let prefix = hospital.prefix.trim().to_uppercase();

    let taken: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM hospitals WHERE LOWER(name) = LOWER(?) OR prefix = ?",
    )
    .bind(name)
    .bind(&prefix)
    .fetch_optional(pool)
    .await?;
    if taken.is_some() {
        return Err(ApiError::Conflict(
            "A hospital with this name or prefix already exists".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO hospitals (id, name, prefix, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(&prefix)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let created: Hospital = sqlx::query_as("SELECT * FROM hospitals WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    info!("🏥 Created hospital {} [{}] ({})", created.name, created.prefix, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== UPDATE HOSPITAL ====================

pub async fn update_hospital(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateHospitalRequest>,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let hospital_id = path.into_inner();
    let pool = &app_state.db_pool;

    let existing: Option<Hospital> = sqlx::query_as("SELECT * FROM hospitals WHERE id = ?")
        .bind(&hospital_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::hospital_not_found(&hospital_id))?;

    let name = update.name.as_deref().map(str::trim).unwrap_or(&existing.name);

    if name.to_lowercase() != existing.name.to_lowercase() {
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT id FROM hospitals WHERE LOWER(name) = LOWER(?) AND id != ?")
                .bind(name)
                .bind(&hospital_id)
                .fetch_optional(pool)
                .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(
                "A hospital with this name already exists".to_string(),
            ));
        }
    }

    sqlx::query("UPDATE hospitals SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(&hospital_id)
        .execute(pool)
        .await?;

    let updated: Hospital = sqlx::query_as("SELECT * FROM hospitals WHERE id = ?")
        .bind(&hospital_id)
        .fetch_one(pool)
        .await?;

    info!("🏥 Updated hospital {} ({})", updated.name, hospital_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== DELETE HOSPITAL ====================

pub async fn delete_hospital(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let hospital_id = path.into_inner();
    let pool = &app_state.db_pool;

    let existing: Option<Hospital> = sqlx::query_as("SELECT * FROM hospitals WHERE id = ?")
        .bind(&hospital_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::hospital_not_found(&hospital_id))?;

    // Boxes embed the prefix in their labels, so an in-use hospital stays
    let box_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE hospital_id = ?")
        .bind(&hospital_id)
        .fetch_one(pool)
        .await?;
    if box_count.0 > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete hospital '{}': {} boxes belong to it",
            existing.name, box_count.0
        )));
    }

    sqlx::query("DELETE FROM box_sequences WHERE hospital_id = ?")
        .bind(&hospital_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM hospitals WHERE id = ?")
        .bind(&hospital_id)
        .execute(pool)
        .await?;

    info!("🏥 Deleted hospital {} ({})", existing.name, hospital_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Hospital deleted successfully".to_string(),
    )))
}
