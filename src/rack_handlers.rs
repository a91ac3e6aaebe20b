// src/rack_handlers.rs
//! Rack registry: warehouse shelving units grouped by aisle.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateRackRequest, Rack, RackWithStats, UpdateRackRequest};
use crate::AppState;

// ==================== GET ALL RACKS ====================

pub async fn get_all_racks(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    // Insertion order, no pagination
    let racks: Vec<RackWithStats> = sqlx::query_as(
        r#"SELECT r.id, r.label, r.aisle, r.capacity, r.hospital_id,
                  (SELECT COUNT(*) FROM boxes b WHERE b.rack_id = r.id) AS box_count,
                  r.created_at, r.updated_at
           FROM racks r
           ORDER BY r.created_at ASC"#,
    )
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(racks)))
}

// ==================== GET RACK BY ID ====================

pub async fn get_rack(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let rack_id = path.into_inner();

    let rack: Option<RackWithStats> = sqlx::query_as(
        r#"SELECT r.id, r.label, r.aisle, r.capacity, r.hospital_id,
                  (SELECT COUNT(*) FROM boxes b WHERE b.rack_id = r.id) AS box_count,
                  r.created_at, r.updated_at
           FROM racks r WHERE r.id = ?"#,
    )
    .bind(&rack_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    match rack {
        Some(r) => Ok(HttpResponse::Ok().json(ApiResponse::success(r))),
        None => Err(ApiError::rack_not_found(&rack_id)),
    }
}

// ==================== CREATE RACK ====================

pub async fn create_rack(
    app_state: web::Data<Arc<AppState>>,
    rack: web::Json<CreateRackRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    rack.validate()?;

    if let Some(ref hospital_id) = rack.hospital_id {
        ensure_hospital_exists(&app_state.db_pool, hospital_id).await?;
    }

    // Auto-label: next free slot number in the aisle
    let label = match rack.label {
        Some(ref l) => l.trim().to_string(),
        None => {
            let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM racks WHERE aisle = ?")
                .bind(rack.aisle)
                .fetch_one(&app_state.db_pool)
                .await?;
            format!("A{}-R{}", rack.aisle, count.0 + 1)
        }
    };

    // Labels are unique within an aisle
    let duplicate: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM racks WHERE aisle = ? AND LOWER(label) = LOWER(?)",
    )
    .bind(rack.aisle)
    .bind(&label)
    .fetch_optional(&app_state.db_pool)
    .await?;

    if duplicate.is_some() {
        return Err(ApiError::duplicate_label(&label));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO racks (id, label, aisle, capacity, hospital_id, created_by, updated_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&label)
    .bind(rack.aisle)
    .bind(rack.capacity)
    .bind(&rack.hospital_id)
    .bind(&user_id)
    .bind(&user_id)
    .bind(now)
    .bind(now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Rack = sqlx::query_as("SELECT * FROM racks WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    info!("🗄️ Created rack {} in aisle {} ({})", label, rack.aisle, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== UPDATE RACK ====================

pub async fn update_rack(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRackRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let rack_id = path.into_inner();

    let existing: Option<Rack> = sqlx::query_as("SELECT * FROM racks WHERE id = ?")
        .bind(&rack_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    let existing = existing.ok_or_else(|| ApiError::rack_not_found(&rack_id))?;

    let box_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE rack_id = ?")
        .bind(&rack_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    // Capacity can never undercut the boxes already on the shelf
    if let Some(new_capacity) = update.capacity {
        if new_capacity < box_count.0 {
            return Err(ApiError::bad_request(&format!(
                "Capacity {} is below the current box count {}",
                new_capacity, box_count.0
            )));
        }
    }

    if let Some(ref new_label) = update.label {
        if new_label.to_lowercase() != existing.label.to_lowercase() {
            let duplicate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM racks WHERE aisle = ? AND LOWER(label) = LOWER(?) AND id != ?",
            )
            .bind(existing.aisle)
            .bind(new_label)
            .bind(&rack_id)
            .fetch_optional(&app_state.db_pool)
            .await?;

            if duplicate.is_some() {
                return Err(ApiError::duplicate_label(new_label));
            }
        }
    }

    let now = Utc::now();
    let label = update.label.as_ref().unwrap_or(&existing.label);
    let capacity = update.capacity.unwrap_or(existing.capacity);
    let hospital_id = update.hospital_id.clone().or(existing.hospital_id);

    sqlx::query(
        r#"UPDATE racks
           SET label = ?, capacity = ?, hospital_id = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(label)
    .bind(capacity)
    .bind(&hospital_id)
    .bind(&user_id)
    .bind(now)
    .bind(&rack_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: Rack = sqlx::query_as("SELECT * FROM racks WHERE id = ?")
        .bind(&rack_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    info!("🗄️ Updated rack {} ({})", updated.label, rack_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== DELETE RACK ====================

pub async fn delete_rack(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let rack_id = path.into_inner();
    delete_rack_record(&app_state.db_pool, &rack_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Rack deleted successfully".to_string(),
    )))
}

pub async fn delete_rack_record(pool: &sqlx::SqlitePool, rack_id: &str) -> ApiResult<()> {
    let rack: Option<Rack> = sqlx::query_as("SELECT * FROM racks WHERE id = ?")
        .bind(rack_id)
        .fetch_optional(pool)
        .await?;

    let rack = rack.ok_or_else(|| ApiError::rack_not_found(rack_id))?;

    // A rack may only be deleted when it holds zero boxes
    let box_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE rack_id = ?")
        .bind(rack_id)
        .fetch_one(pool)
        .await?;

    if box_count.0 > 0 {
        return Err(ApiError::rack_not_empty(&rack.label, box_count.0));
    }

    sqlx::query("DELETE FROM racks WHERE id = ?")
        .bind(rack_id)
        .execute(pool)
        .await?;

    info!("🗄️ Deleted rack {} ({})", rack.label, rack_id);
    Ok(())
}

// ==================== HELPERS ====================

pub async fn ensure_hospital_exists(pool: &sqlx::SqlitePool, hospital_id: &str) -> ApiResult<()> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM hospitals WHERE id = ?")
        .bind(hospital_id)
        .fetch_optional(pool)
        .await?;

    if found.is_none() {
        return Err(ApiError::hospital_not_found(hospital_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_handlers::{create_box_record, delete_box_record};
    use crate::db::test_pool;
    use crate::models::CreateBoxRequest;
    use sqlx::SqlitePool;

    async fn seed_hospital(pool: &SqlitePool) -> String {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
             VALUES ('tester', 'tester', 'tester@example.com', 'x', 'mrd_staff', datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO hospitals (id, name, prefix, created_at, updated_at)
             VALUES ('hosp-1', 'General Hospital', 'GH', datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
        "hosp-1".to_string()
    }

    async fn seed_rack(pool: &SqlitePool, capacity: i64) -> String {
        sqlx::query(
            "INSERT INTO racks (id, label, aisle, capacity, created_at, updated_at)
             VALUES ('rack-1', 'A1-R1', 1, ?, datetime('now'), datetime('now'))",
        )
        .bind(capacity)
        .execute(pool)
        .await
        .unwrap();
        "rack-1".to_string()
    }

    #[actix_rt::test]
    async fn test_rack_delete_blocked_until_empty() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;

        let storage_box = create_box_record(
            &pool,
            &CreateBoxRequest {
                rack_id: rack.clone(),
                label: None,
                capacity: 5,
                category: "IPD".to_string(),
                hospital_id: hospital,
            },
            "tester",
        )
        .await
        .unwrap();

        // Occupied rack: delete refused, rack and box untouched
        let err = delete_rack_record(&pool, &rack).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let still_there: Option<(String,)> = sqlx::query_as("SELECT id FROM racks WHERE id = ?")
            .bind(&rack)
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(still_there.is_some());

        // Emptied rack deletes cleanly
        delete_box_record(&pool, &storage_box.id).await.unwrap();
        delete_rack_record(&pool, &rack).await.unwrap();

        let gone: Option<(String,)> = sqlx::query_as("SELECT id FROM racks WHERE id = ?")
            .bind(&rack)
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[actix_rt::test]
    async fn test_delete_missing_rack_reports_not_found() {
        let pool = test_pool().await;
        let err = delete_rack_record(&pool, "no-such-rack").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
