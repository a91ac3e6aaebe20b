// src/request_handlers.rs
//! File requests: wards ask the warehouse for a physical box. Status
//! changes go through `RequestStatus::can_transition_to`; the single
//! exception is the requester cancelling their own request, which is
//! allowed from any non-terminal state.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Session;
use crate::box_handlers::ensure_box_exists;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    CreateFileRequestRequest, FileRequest, FileRequestWithBox, RequestStatus,
    UpdateRequestStatusRequest,
};
use crate::AppState;

// ==================== GET REQUESTS ====================

pub async fn get_requests(
    app_state: web::Data<Arc<AppState>>,
    session: Session,
) -> ApiResult<HttpResponse> {
    // Staff see the whole queue, everyone else only their own requests
    let sql_all = r#"SELECT fr.id, fr.box_id, b.label AS box_label, r.label AS rack_label,
                            fr.requester_id, fr.requester_name, fr.status, fr.notes,
                            fr.request_date, fr.updated_at
                     FROM file_requests fr
                     JOIN boxes b ON b.id = fr.box_id
                     JOIN racks r ON r.id = b.rack_id"#;

    let requests: Vec<FileRequestWithBox> = if session.role.can_manage_requests() {
        sqlx::query_as(&format!("{} ORDER BY fr.request_date DESC", sql_all))
            .fetch_all(&app_state.db_pool)
            .await?
    } else {
        sqlx::query_as(&format!(
            "{} WHERE fr.requester_id = ? ORDER BY fr.request_date DESC",
            sql_all
        ))
        .bind(&session.user_id)
        .fetch_all(&app_state.db_pool)
        .await?
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(requests)))
}

// ==================== CREATE REQUEST ====================

pub async fn create_request(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateFileRequestRequest>,
    session: Session,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let created = create_request_record(
        &app_state.db_pool,
        &request,
        &session.user_id,
        &session.username,
    )
    .await?;

    info!(
        "📋 {} requested box {} ({})",
        created.requester_name, created.box_id, created.id
    );
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn create_request_record(
    pool: &SqlitePool,
    request: &CreateFileRequestRequest,
    requester_id: &str,
    requester_name: &str,
) -> ApiResult<FileRequest> {
    ensure_box_exists(pool, &request.box_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO file_requests
           (id, box_id, requester_id, requester_name, status, notes, request_date, updated_at)
           VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&request.box_id)
    .bind(requester_id)
    .bind(requester_name)
    .bind(&request.notes)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let created: FileRequest = sqlx::query_as("SELECT * FROM file_requests WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(created)
}

// ==================== UPDATE STATUS ====================

pub async fn update_request_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRequestStatusRequest>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();
    let updated =
        transition_request(&app_state.db_pool, &request_id, &update.status).await?;

    info!("📋 Request {} -> {}", request_id, updated.status);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn transition_request(
    pool: &SqlitePool,
    request_id: &str,
    new_status: &str,
) -> ApiResult<FileRequest> {
    let target: RequestStatus = new_status
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| ApiError::bad_request(&format!("Unknown request status '{}'", new_status)))?;

    let existing: Option<FileRequest> = sqlx::query_as("SELECT * FROM file_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::not_found("File request"))?;

    let current: RequestStatus = existing
        .status
        .parse()
        .map_err(|_| ApiError::InternalServerError("Corrupt request status".to_string()))?;

    if !current.can_transition_to(target) {
        return Err(ApiError::invalid_status_transition(
            &existing.status,
            &target.to_string(),
        ));
    }

    apply_status(pool, request_id, target).await
}

// ==================== CANCEL (REQUESTER) ====================

pub async fn cancel_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();
    let cancelled = cancel_request_record(
        &app_state.db_pool,
        &request_id,
        &session.user_id,
        session.role.can_manage_requests(),
    )
    .await?;

    info!("📋 Request {} cancelled", request_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(cancelled)))
}

/// Requester's universal cancel: works from any non-terminal state,
/// no role needed on your own request.
pub async fn cancel_request_record(
    pool: &SqlitePool,
    request_id: &str,
    actor_id: &str,
    actor_is_staff: bool,
) -> ApiResult<FileRequest> {
    let existing: Option<FileRequest> = sqlx::query_as("SELECT * FROM file_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::not_found("File request"))?;

    if existing.requester_id != actor_id && !actor_is_staff {
        return Err(ApiError::Forbidden(
            "Only the requester can cancel this request".to_string(),
        ));
    }

    let current: RequestStatus = existing
        .status
        .parse()
        .map_err(|_| ApiError::InternalServerError("Corrupt request status".to_string()))?;
    if current.is_terminal() {
        return Err(ApiError::invalid_status_transition(
            &existing.status,
            &RequestStatus::Cancelled.to_string(),
        ));
    }

    apply_status(pool, request_id, RequestStatus::Cancelled).await
}

async fn apply_status(
    pool: &SqlitePool,
    request_id: &str,
    status: RequestStatus,
) -> ApiResult<FileRequest> {
    sqlx::query("UPDATE file_requests SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(request_id)
        .execute(pool)
        .await?;

    let updated: FileRequest = sqlx::query_as("SELECT * FROM file_requests WHERE id = ?")
        .bind(request_id)
        .fetch_one(pool)
        .await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_world(pool: &SqlitePool) -> String {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
             VALUES ('user-1', 'ward4', 'ward4@example.org', 'x', 'viewer', datetime('now'), datetime('now'))",
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
        sqlx::query(
            "INSERT INTO racks (id, label, aisle, capacity, created_at, updated_at)
             VALUES ('rack-1', 'A1-R1', 1, 10, datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO boxes (id, label, rack_id, capacity, status, category, hospital_id, created_at, updated_at)
             VALUES ('box-1', 'GH-IPD-001', 'rack-1', 5, 'open', 'IPD', 'hosp-1', datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
        "box-1".to_string()
    }

    async fn seed_request(pool: &SqlitePool, box_id: &str) -> FileRequest {
        create_request_record(
            pool,
            &CreateFileRequestRequest {
                box_id: box_id.to_string(),
                notes: Some("urgent".to_string()),
            },
            "user-1",
            "ward4",
        )
        .await
        .unwrap()
    }

    #[actix_rt::test]
    async fn test_full_request_lifecycle() {
        let pool = test_pool().await;
        let box_id = seed_world(&pool).await;
        let request = seed_request(&pool, &box_id).await;
        assert_eq!(request.status, "pending");

        for status in ["approved", "in_transit", "delivered", "return_requested", "returned"] {
            let updated = transition_request(&pool, &request.id, status).await.unwrap();
            assert_eq!(updated.status, status);
        }

        // Returned is terminal
        let err = transition_request(&pool, &request.id, "pending")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn test_illegal_transition_rejected() {
        let pool = test_pool().await;
        let box_id = seed_world(&pool).await;
        let request = seed_request(&pool, &box_id).await;

        let err = transition_request(&pool, &request.id, "delivered")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = transition_request(&pool, &request.id, "lost").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[actix_rt::test]
    async fn test_requester_cancels_from_any_active_state() {
        let pool = test_pool().await;
        let box_id = seed_world(&pool).await;

        // Delivered is deep in the machine yet still cancellable by the owner
        let request = seed_request(&pool, &box_id).await;
        transition_request(&pool, &request.id, "in_transit").await.unwrap();
        transition_request(&pool, &request.id, "delivered").await.unwrap();

        let cancelled = cancel_request_record(&pool, &request.id, "user-1", false)
            .await
            .unwrap();
        assert_eq!(cancelled.status, "cancelled");

        // Terminal now, a second cancel is refused
        let err = cancel_request_record(&pool, &request.id, "user-1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn test_strangers_cannot_cancel() {
        let pool = test_pool().await;
        let box_id = seed_world(&pool).await;
        let request = seed_request(&pool, &box_id).await;

        let err = cancel_request_record(&pool, &request.id, "someone-else", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // Warehouse staff may cancel on the requester's behalf
        let cancelled = cancel_request_record(&pool, &request.id, "someone-else", true)
            .await
            .unwrap();
        assert_eq!(cancelled.status, "cancelled");
    }
}
