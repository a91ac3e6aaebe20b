// src/movement_handlers.rs
//! Movement ledger. Every physical check-in/check-out of a file is a
//! single appended row; the ledger has no update or delete path and is
//! independent of box assignment on purpose.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, LimitQuery};
use crate::models::{MovementLog, MovementType, RecordMovementRequest};
use crate::AppState;

// ==================== RECORD MOVEMENT ====================

pub async fn record_movement(
    app_state: web::Data<Arc<AppState>>,
    movement: web::Json<RecordMovementRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    movement.validate()?;

    let entry = append_movement(&app_state.db_pool, &movement, Some(&user_id)).await?;

    info!(
        "🚚 {} {} -> {}",
        entry.movement_type, entry.uhid, entry.destination
    );
    Ok(HttpResponse::Created().json(ApiResponse::success(entry)))
}

pub async fn append_movement(
    pool: &SqlitePool,
    movement: &RecordMovementRequest,
    recorded_by: Option<&str>,
) -> ApiResult<MovementLog> {
    let movement_type = movement.movement_type.trim().to_uppercase();
    if !MovementType::is_valid(&movement_type) {
        return Err(ApiError::bad_request(
            "Movement type must be 'CHECK-IN' or 'CHECK-OUT'",
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO movement_logs
           (id, movement_type, uhid, patient_name, destination, status, recorded_by, created_at)
           VALUES (?, ?, ?, ?, ?, 'completed', ?, ?)"#,
    )
    .bind(&id)
    .bind(&movement_type)
    .bind(movement.uhid.trim().to_uppercase())
    .bind(movement.name.trim())
    .bind(movement.dest.trim())
    .bind(recorded_by)
    .bind(now)
    .execute(pool)
    .await?;

    let entry: MovementLog = sqlx::query_as("SELECT * FROM movement_logs WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(entry)
}

// ==================== GET MOVEMENT LOGS ====================

pub async fn get_movement_logs(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query.normalize(100, 500);

    // Newest first
    let logs: Vec<MovementLog> = sqlx::query_as(
        "SELECT * FROM movement_logs ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(logs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn movement(kind: &str, uhid: &str, dest: &str) -> RecordMovementRequest {
        RecordMovementRequest {
            movement_type: kind.to_string(),
            uhid: uhid.to_string(),
            name: "Asha Rao".to_string(),
            dest: dest.to_string(),
        }
    }

    #[actix_rt::test]
    async fn test_ledger_keeps_call_order() {
        let pool = test_pool().await;

        append_movement(&pool, &movement("CHECK-OUT", "UHID0001", "Ward 4"), None)
            .await
            .unwrap();
        append_movement(&pool, &movement("check-in", "UHID0001", "Warehouse"), None)
            .await
            .unwrap();

        let rows: Vec<MovementLog> =
            sqlx::query_as("SELECT * FROM movement_logs ORDER BY rowid ASC")
                .fetch_all(&pool)
                .await
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].movement_type, "CHECK-OUT");
        assert_eq!(rows[0].destination, "Ward 4");
        // Lower-case input is normalized before the CHECK constraint sees it
        assert_eq!(rows[1].movement_type, "CHECK-IN");
        assert_eq!(rows[1].status, "completed");
    }

    #[actix_rt::test]
    async fn test_unknown_movement_type_rejected() {
        let pool = test_pool().await;
        let err = append_movement(&pool, &movement("TRANSFER", "UHID0001", "Ward 4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM movement_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}
