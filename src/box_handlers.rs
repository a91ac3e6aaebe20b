// src/box_handlers.rs
//! Storage box registry. Box labels are server-generated from the
//! hospital prefix and category; the per-(hospital, category) sequence
//! counter is bumped atomically inside the create transaction so two
//! concurrent creates can never mint the same label.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    BoxCategory, BoxFilterQuery, BoxStatus, BoxWithStats, CreateBoxRequest, NextSequenceQuery,
    NextSequenceResponse, PatientRecord, Rack, SetBoxStatusRequest, StorageBox, UpdateBoxRequest,
};
use crate::AppState;

fn compose_label(prefix: &str, category: &str, seq: i64) -> String {
    format!("{}-{}-{:03}", prefix, category, seq)
}

// ==================== GET BOXES ====================

pub async fn get_boxes(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BoxFilterQuery>,
) -> ApiResult<HttpResponse> {
    let mut sql = String::from(
        r#"SELECT b.id, b.label, b.rack_id, r.label AS rack_label, r.aisle,
                  b.capacity, b.status, b.category, b.hospital_id,
                  (SELECT COUNT(*) FROM patient_records p WHERE p.box_id = b.id) AS patient_count,
                  b.created_at, b.updated_at
           FROM boxes b
           JOIN racks r ON r.id = b.rack_id
           WHERE 1=1"#,
    );

    let mut binds: Vec<String> = Vec::new();
    if let Some(ref rack_id) = query.rack_id {
        sql.push_str(" AND b.rack_id = ?");
        binds.push(rack_id.clone());
    }
    if let Some(ref hospital_id) = query.hospital_id {
        sql.push_str(" AND b.hospital_id = ?");
        binds.push(hospital_id.clone());
    }
    if let Some(ref status) = query.status {
        if !BoxStatus::is_valid(status) {
            return Err(ApiError::bad_request("Status must be 'open' or 'closed'"));
        }
        sql.push_str(" AND b.status = ?");
        binds.push(status.clone());
    }
    sql.push_str(" ORDER BY b.created_at ASC");

    let mut q = sqlx::query_as::<_, BoxWithStats>(&sql);
    for bind in &binds {
        q = q.bind(bind);
    }
    let boxes = q.fetch_all(&app_state.db_pool).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(boxes)))
}

// ==================== GET BOX BY ID ====================

pub async fn get_box(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let box_id = path.into_inner();

    let found: Option<BoxWithStats> = sqlx::query_as(
        r#"SELECT b.id, b.label, b.rack_id, r.label AS rack_label, r.aisle,
                  b.capacity, b.status, b.category, b.hospital_id,
                  (SELECT COUNT(*) FROM patient_records p WHERE p.box_id = b.id) AS patient_count,
                  b.created_at, b.updated_at
           FROM boxes b
           JOIN racks r ON r.id = b.rack_id
           WHERE b.id = ?"#,
    )
    .bind(&box_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    match found {
        Some(b) => Ok(HttpResponse::Ok().json(ApiResponse::success(b))),
        None => Err(ApiError::box_not_found(&box_id)),
    }
}

// ==================== GET BOX PATIENTS ====================

pub async fn get_box_patients(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let box_id = path.into_inner();
    ensure_box_exists(&app_state.db_pool, &box_id).await?;

    let patients: Vec<PatientRecord> = sqlx::query_as(
        "SELECT * FROM patient_records WHERE box_id = ? ORDER BY name ASC",
    )
    .bind(&box_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(patients)))
}

// ==================== NEXT SEQUENCE (PREVIEW) ====================

/// Non-allocating preview of the label the next create would mint.
/// For form prefill only: the counter is bumped by create, not here.
pub async fn get_next_sequence(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<NextSequenceQuery>,
) -> ApiResult<HttpResponse> {
    let category = query.category.trim().to_uppercase();
    if !BoxCategory::is_valid(&category) {
        return Err(ApiError::bad_request(&format!(
            "Category must be one of: {}",
            BoxCategory::valid_values()
        )));
    }

    let prefix = hospital_prefix(&app_state.db_pool, &query.hospital_id).await?;

    let seq: Option<(i64,)> = sqlx::query_as(
        "SELECT next_seq FROM box_sequences WHERE hospital_id = ? AND category = ?",
    )
    .bind(&query.hospital_id)
    .bind(&category)
    .fetch_optional(&app_state.db_pool)
    .await?;

    let next = seq.map(|s| s.0).unwrap_or(1);
    Ok(HttpResponse::Ok().json(ApiResponse::success(NextSequenceResponse {
        full_label: compose_label(&prefix, &category, next),
    })))
}

// ==================== CREATE BOX ====================

pub async fn create_box(
    app_state: web::Data<Arc<AppState>>,
    box_req: web::Json<CreateBoxRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    box_req.validate()?;
    let created = create_box_record(&app_state.db_pool, &box_req, &user_id).await?;

    info!(
        "📦 Created box {} in rack {} ({})",
        created.label, created.rack_id, created.id
    );
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

/// Core create path, transactional so the sequence bump and the insert
/// land together or not at all.
pub async fn create_box_record(
    pool: &SqlitePool,
    box_req: &CreateBoxRequest,
    user_id: &str,
) -> ApiResult<StorageBox> {
    let category = box_req.category.trim().to_uppercase();
    if !BoxCategory::is_valid(&category) {
        return Err(ApiError::bad_request(&format!(
            "Category must be one of: {}",
            BoxCategory::valid_values()
        )));
    }

    let rack: Option<Rack> = sqlx::query_as("SELECT * FROM racks WHERE id = ?")
        .bind(&box_req.rack_id)
        .fetch_optional(pool)
        .await?;
    let rack = rack.ok_or_else(|| ApiError::rack_not_found(&box_req.rack_id))?;

    let prefix = hospital_prefix(pool, &box_req.hospital_id).await?;

    // Early, friendly rejection; the guarded insert below is the
    // authoritative check
    let box_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE rack_id = ?")
        .bind(&box_req.rack_id)
        .fetch_one(pool)
        .await?;
    if box_count.0 >= rack.capacity {
        return Err(ApiError::rack_full(&rack.label, rack.capacity));
    }

    let mut tx = pool.begin().await?;

    let label = match box_req.label {
        Some(ref l) => l.trim().to_string(),
        None => {
            sqlx::query(
                r#"INSERT INTO box_sequences (hospital_id, category, next_seq)
                   VALUES (?, ?, 1)
                   ON CONFLICT(hospital_id, category) DO NOTHING"#,
            )
            .bind(&box_req.hospital_id)
            .bind(&category)
            .execute(&mut *tx)
            .await?;

            let seq: (i64,) = sqlx::query_as(
                "SELECT next_seq FROM box_sequences WHERE hospital_id = ? AND category = ?",
            )
            .bind(&box_req.hospital_id)
            .bind(&category)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE box_sequences SET next_seq = next_seq + 1 WHERE hospital_id = ? AND category = ?",
            )
            .bind(&box_req.hospital_id)
            .bind(&category)
            .execute(&mut *tx)
            .await?;

            compose_label(&prefix, &category, seq.0)
        }
    };

    // Box labels are globally unique
    let duplicate: Option<(String,)> =
        sqlx::query_as("SELECT id FROM boxes WHERE LOWER(label) = LOWER(?)")
            .bind(&label)
            .fetch_optional(&mut *tx)
            .await?;
    if duplicate.is_some() {
        return Err(ApiError::duplicate_label(&label));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    // A rack never holds more boxes than its capacity. The count is
    // re-evaluated inside the insert so a racing create cannot slip a
    // box past the limit; a zero-row insert rolls the sequence bump
    // back with the transaction.
    let inserted = sqlx::query(
        r#"INSERT INTO boxes
           (id, label, rack_id, capacity, status, category, hospital_id, created_by, updated_by, created_at, updated_at)
           SELECT ?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7, ?8, ?9, ?10
           WHERE (SELECT COUNT(*) FROM boxes WHERE rack_id = ?3) < ?11"#,
    )
    .bind(&id)
    .bind(&label)
    .bind(&box_req.rack_id)
    .bind(box_req.capacity)
    .bind(&category)
    .bind(&box_req.hospital_id)
    .bind(user_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .bind(rack.capacity)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::rack_full(&rack.label, rack.capacity));
    }

    tx.commit().await?;

    let created: StorageBox = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(created)
}

// ==================== UPDATE BOX ====================

pub async fn update_box(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateBoxRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let box_id = path.into_inner();
    let pool = &app_state.db_pool;

    let existing: Option<StorageBox> = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(&box_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::box_not_found(&box_id))?;

    // Capacity must not drop below the files already inside
    if let Some(new_capacity) = update.capacity {
        let patient_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM patient_records WHERE box_id = ?")
                .bind(&box_id)
                .fetch_one(pool)
                .await?;
        if new_capacity < patient_count.0 {
            return Err(ApiError::bad_request(&format!(
                "Capacity {} is below the current file count {}",
                new_capacity, patient_count.0
            )));
        }
    }

    if let Some(ref new_label) = update.label {
        if new_label.to_lowercase() != existing.label.to_lowercase() {
            let duplicate: Option<(String,)> =
                sqlx::query_as("SELECT id FROM boxes WHERE LOWER(label) = LOWER(?) AND id != ?")
                    .bind(new_label)
                    .bind(&box_id)
                    .fetch_optional(pool)
                    .await?;
            if duplicate.is_some() {
                return Err(ApiError::duplicate_label(new_label));
            }
        }
    }

    let label = update.label.as_ref().unwrap_or(&existing.label);
    let capacity = update.capacity.unwrap_or(existing.capacity);
    let now = Utc::now();

    sqlx::query("UPDATE boxes SET label = ?, capacity = ?, updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(label)
        .bind(capacity)
        .bind(&user_id)
        .bind(now)
        .bind(&box_id)
        .execute(pool)
        .await?;

    let updated: StorageBox = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(&box_id)
        .fetch_one(pool)
        .await?;

    info!("📦 Updated box {} ({})", updated.label, box_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== SET BOX STATUS ====================

pub async fn set_box_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    status_req: web::Json<SetBoxStatusRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let box_id = path.into_inner();
    let pool = &app_state.db_pool;

    let existing: Option<StorageBox> = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(&box_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::box_not_found(&box_id))?;

    let new_status = if status_req.open {
        BoxStatus::Open
    } else {
        BoxStatus::Closed
    };
    let now = Utc::now();

    sqlx::query("UPDATE boxes SET status = ?, updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(new_status.to_string())
        .bind(&user_id)
        .bind(now)
        .bind(&box_id)
        .execute(pool)
        .await?;

    let updated: StorageBox = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(&box_id)
        .fetch_one(pool)
        .await?;

    info!(
        "📦 Box {} status: {} -> {}",
        existing.label, existing.status, updated.status
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== DELETE BOX ====================

pub async fn delete_box(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let box_id = path.into_inner();
    delete_box_record(&app_state.db_pool, &box_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Box deleted successfully".to_string(),
    )))
}

pub async fn delete_box_record(pool: &SqlitePool, box_id: &str) -> ApiResult<()> {
    let existing: Option<StorageBox> = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(box_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::box_not_found(box_id))?;

    // Delete only when no files point at the box
    let patient_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM patient_records WHERE box_id = ?")
            .bind(box_id)
            .fetch_one(pool)
            .await?;
    if patient_count.0 > 0 {
        return Err(ApiError::box_not_empty(&existing.label, patient_count.0));
    }

    sqlx::query("DELETE FROM boxes WHERE id = ?")
        .bind(box_id)
        .execute(pool)
        .await?;

    info!("📦 Deleted box {} ({})", existing.label, box_id);
    Ok(())
}

// ==================== HELPERS ====================

pub async fn ensure_box_exists(pool: &SqlitePool, box_id: &str) -> ApiResult<()> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM boxes WHERE id = ?")
        .bind(box_id)
        .fetch_optional(pool)
        .await?;
    if found.is_none() {
        return Err(ApiError::box_not_found(box_id));
    }
    Ok(())
}

async fn hospital_prefix(pool: &SqlitePool, hospital_id: &str) -> ApiResult<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT prefix FROM hospitals WHERE id = ?")
        .bind(hospital_id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| r.0)
        .ok_or_else(|| ApiError::hospital_not_found(hospital_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_compose_label() {
        assert_eq!(compose_label("GH", "IPD", 1), "GH-IPD-001");
        assert_eq!(compose_label("KMC", "DEATH", 42), "KMC-DEATH-042");
        assert_eq!(compose_label("GH", "OPD", 1234), "GH-OPD-1234");
    }

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

    fn box_request(rack_id: &str, hospital_id: &str) -> CreateBoxRequest {
        CreateBoxRequest {
            rack_id: rack_id.to_string(),
            label: None,
            capacity: 5,
            category: "IPD".to_string(),
            hospital_id: hospital_id.to_string(),
        }
    }

    async fn boxes_in_rack(pool: &SqlitePool, rack_id: &str) -> i64 {
        let c: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM boxes WHERE rack_id = ?")
            .bind(rack_id)
            .fetch_one(pool)
            .await
            .unwrap();
        c.0
    }

    #[actix_rt::test]
    async fn test_rack_capacity_caps_box_creation() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 1).await;

        create_box_record(&pool, &box_request(&rack, &hospital), "tester")
            .await
            .unwrap();

        let err = create_box_record(&pool, &box_request(&rack, &hospital), "tester")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(boxes_in_rack(&pool, &rack).await, 1);
    }

    #[actix_rt::test]
    async fn test_racing_creates_cannot_overfill_rack() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 1).await;

        // Two creates race on the same capacity-1 rack; the insert
        // guard lets exactly one of them land
        let req_a = box_request(&rack, &hospital);
        let req_b = box_request(&rack, &hospital);
        let (a, b) = tokio::join!(
            create_box_record(&pool, &req_a, "tester"),
            create_box_record(&pool, &req_b, "tester"),
        );

        assert_eq!(a.is_ok() as i64 + b.is_ok() as i64, 1);
        assert_eq!(boxes_in_rack(&pool, &rack).await, 1);
    }
}
