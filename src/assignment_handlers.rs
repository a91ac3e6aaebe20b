// src/assignment_handlers.rs
//! File-assignment engine. A patient record carries at most one box_id;
//! assigning and unassigning are single FK mutations. Bulk operations
//! are best-effort batches in list order: a failed identifier never
//! rolls back the ones that already succeeded.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::SqlitePool;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{BulkAssignRequest, BulkResult, BulkUnassignRequest, PatientRecord, StorageBox};
use crate::AppState;

// ==================== BULK ASSIGN ====================

pub async fn bulk_assign(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<BulkAssignRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let result =
        bulk_assign_files(&app_state.db_pool, &request.box_id, &request.identifiers).await?;

    info!(
        "🗂️ Bulk assign to box {}: {} assigned, {} failed",
        request.box_id,
        result.assigned,
        result.failed.len()
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

/// Batch contract: a box that is missing or not OPEN fails the whole
/// batch up front; everything else is per-identifier.
pub async fn bulk_assign_files(
    pool: &SqlitePool,
    box_id: &str,
    identifiers: &[String],
) -> ApiResult<BulkResult> {
    let storage_box: Option<StorageBox> = sqlx::query_as("SELECT * FROM boxes WHERE id = ?")
        .bind(box_id)
        .fetch_optional(pool)
        .await?;
    let storage_box = storage_box.ok_or_else(|| ApiError::box_not_found(box_id))?;

    if !storage_box.is_open() {
        return Err(ApiError::box_closed(&storage_box.label));
    }

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patient_records WHERE box_id = ?")
        .bind(box_id)
        .fetch_one(pool)
        .await?;
    let mut occupied = count.0;

    let mut result = BulkResult::default();

    for identifier in identifiers {
        // Once the box is full every remaining identifier fails the same way
        if occupied >= storage_box.capacity {
            result.box_full = true;
            result.fail(identifier, "box_full");
            continue;
        }

        let record = match resolve_identifier(pool, identifier).await? {
            Some(r) => r,
            None => {
                result.fail(identifier, "not found");
                continue;
            }
        };

        match record.box_id.as_deref() {
            Some(current) if current == box_id => {
                result.fail(identifier, "already in this box");
                continue;
            }
            Some(_) => {
                // Moving a file requires an explicit unassign first
                result.fail(identifier, "already assigned to another box");
                continue;
            }
            None => {}
        }

        // The capacity check rides inside the UPDATE so a concurrent
        // batch racing on the same box cannot overfill it
        let changed = sqlx::query(
            r#"UPDATE patient_records SET box_id = ?1, updated_at = ?2
               WHERE id = ?3
                 AND (SELECT COUNT(*) FROM patient_records WHERE box_id = ?1)
                     < (SELECT capacity FROM boxes WHERE id = ?1)"#,
        )
        .bind(box_id)
        .bind(Utc::now())
        .bind(record.id)
        .execute(pool)
        .await?;

        if changed.rows_affected() == 0 {
            result.box_full = true;
            result.fail(identifier, "box_full");
            continue;
        }

        occupied += 1;
        result.ok(identifier);
    }

    Ok(result)
}

// ==================== BULK UNASSIGN ====================

pub async fn bulk_unassign(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<BulkUnassignRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let result = bulk_unassign_files(&app_state.db_pool, &request.identifiers).await?;

    info!(
        "🗂️ Bulk unassign: {} released, {} failed",
        result.assigned,
        result.failed.len()
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(result)))
}

pub async fn bulk_unassign_files(
    pool: &SqlitePool,
    identifiers: &[String],
) -> ApiResult<BulkResult> {
    let mut result = BulkResult::default();

    for identifier in identifiers {
        let record = match resolve_identifier(pool, identifier).await? {
            Some(r) => r,
            None => {
                result.fail(identifier, "not found");
                continue;
            }
        };

        if record.box_id.is_none() {
            result.fail(identifier, "not assigned to any box");
            continue;
        }

        sqlx::query("UPDATE patient_records SET box_id = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(record.id)
            .execute(pool)
            .await?;

        result.ok(identifier);
    }

    Ok(result)
}

// ==================== IDENTIFIER RESOLUTION ====================

/// Resolution order: integer record id, then UHID, then MRD.
pub async fn resolve_identifier(
    pool: &SqlitePool,
    raw: &str,
) -> Result<Option<PatientRecord>, sqlx::Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(record_id) = raw.parse::<i64>() {
        let by_id: Option<PatientRecord> =
            sqlx::query_as("SELECT * FROM patient_records WHERE id = ?")
                .bind(record_id)
                .fetch_optional(pool)
                .await?;
        if by_id.is_some() {
            return Ok(by_id);
        }
    }

    let upper = raw.to_uppercase();
    let by_uhid: Option<PatientRecord> =
        sqlx::query_as("SELECT * FROM patient_records WHERE uhid = ?")
            .bind(&upper)
            .fetch_optional(pool)
            .await?;
    if by_uhid.is_some() {
        return Ok(by_uhid);
    }

    sqlx::query_as("SELECT * FROM patient_records WHERE mrd = ?")
        .bind(&upper)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_handlers::{create_box_record, delete_box_record};
    use crate::db::test_pool;
    use crate::models::CreateBoxRequest;

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

    async fn seed_box(pool: &SqlitePool, rack_id: &str, hospital_id: &str, capacity: i64) -> String {
        let created = create_box_record(
            pool,
            &CreateBoxRequest {
                rack_id: rack_id.to_string(),
                label: None,
                capacity,
                category: "IPD".to_string(),
                hospital_id: hospital_id.to_string(),
            },
            "tester",
        )
        .await
        .unwrap();
        created.id
    }

    async fn seed_patient(pool: &SqlitePool, uhid: &str, mrd: &str, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO patient_records (uhid, mrd, name, created_at, updated_at)
             VALUES (?, ?, ?, datetime('now'), datetime('now'))",
        )
        .bind(uhid)
        .bind(mrd)
        .bind(name)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn box_count(pool: &SqlitePool, box_id: &str) -> i64 {
        let c: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patient_records WHERE box_id = ?")
            .bind(box_id)
            .fetch_one(pool)
            .await
            .unwrap();
        c.0
    }

    #[actix_rt::test]
    async fn test_assign_never_exceeds_capacity() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 2).await;

        for (i, (uhid, mrd)) in [("UHID0001", "MRD001"), ("UHID0002", "MRD002"), ("UHID0003", "MRD003")]
            .iter()
            .enumerate()
        {
            seed_patient(&pool, uhid, mrd, &format!("Patient {}", i)).await;
        }

        let result = bulk_assign_files(
            &pool,
            &box_id,
            &[
                "UHID0001".to_string(),
                "UHID0002".to_string(),
                "UHID0003".to_string(),
            ],
        )
        .await
        .unwrap();

        assert_eq!(result.assigned, 2);
        assert!(result.box_full);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].identifier, "UHID0003");
        assert_eq!(result.failed[0].reason, "box_full");
        assert_eq!(box_count(&pool, &box_id).await, 2);
    }

    #[actix_rt::test]
    async fn test_racing_batches_cannot_overfill_box() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 1).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;
        seed_patient(&pool, "UHID0002", "MRD002", "Vikram Shah").await;

        // Two batches race on the same capacity-1 box; the guarded
        // update lets exactly one of them through
        let batch_a = ["UHID0001".to_string()];
        let batch_b = ["UHID0002".to_string()];
        let (a, b) = tokio::join!(
            bulk_assign_files(&pool, &box_id, &batch_a),
            bulk_assign_files(&pool, &box_id, &batch_b),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.assigned + b.assigned, 1);
        assert!(a.box_full || b.box_full);
        assert_eq!(box_count(&pool, &box_id).await, 1);
    }

    #[actix_rt::test]
    async fn test_assign_to_closed_box_fails_whole_batch() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 5).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;

        sqlx::query("UPDATE boxes SET status = 'closed' WHERE id = ?")
            .bind(&box_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = bulk_assign_files(&pool, &box_id, &["UHID0001".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(box_count(&pool, &box_id).await, 0);
    }

    #[actix_rt::test]
    async fn test_assign_then_unassign_round_trip() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 5).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;
        seed_patient(&pool, "UHID0002", "MRD002", "Vikram Shah").await;

        let ids = vec!["UHID0001".to_string(), "UHID0002".to_string()];
        let assigned = bulk_assign_files(&pool, &box_id, &ids).await.unwrap();
        assert_eq!(assigned.assigned, 2);
        assert_eq!(box_count(&pool, &box_id).await, 2);

        let released = bulk_unassign_files(&pool, &ids).await.unwrap();
        assert_eq!(released.assigned, 2);
        assert_eq!(box_count(&pool, &box_id).await, 0);
    }

    #[actix_rt::test]
    async fn test_mixed_batch_keeps_valid_assignments() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 5).await;
        let record_id = seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;

        let result = bulk_assign_files(
            &pool,
            &box_id,
            &[record_id.to_string(), "NO-SUCH-FILE".to_string()],
        )
        .await
        .unwrap();

        // The valid half sticks, the invalid half is reported, nothing rolls back
        assert_eq!(result.assigned, 1);
        assert!(!result.box_full);
        assert_eq!(result.succeeded, vec![record_id.to_string()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].reason, "not found");
        assert_eq!(box_count(&pool, &box_id).await, 1);
    }

    #[actix_rt::test]
    async fn test_duplicate_and_cross_box_assignment() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_a = seed_box(&pool, &rack, &hospital, 5).await;
        let box_b = seed_box(&pool, &rack, &hospital, 5).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;

        bulk_assign_files(&pool, &box_a, &["UHID0001".to_string()])
            .await
            .unwrap();

        let again = bulk_assign_files(&pool, &box_a, &["UHID0001".to_string()])
            .await
            .unwrap();
        assert_eq!(again.assigned, 0);
        assert_eq!(again.failed[0].reason, "already in this box");

        let other = bulk_assign_files(&pool, &box_b, &["UHID0001".to_string()])
            .await
            .unwrap();
        assert_eq!(other.assigned, 0);
        assert_eq!(other.failed[0].reason, "already assigned to another box");
        assert_eq!(box_count(&pool, &box_a).await, 1);
    }

    #[actix_rt::test]
    async fn test_identifier_resolution_order() {
        let pool = test_pool().await;
        // A UHID that looks numeric must still lose to a record-id match
        let id_a = seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;
        seed_patient(&pool, &id_a.to_string().repeat(4), "MRD002", "Vikram Shah").await;

        let by_id = resolve_identifier(&pool, &id_a.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.id, id_a);

        let by_uhid = resolve_identifier(&pool, "uhid0001").await.unwrap().unwrap();
        assert_eq!(by_uhid.id, id_a);

        let by_mrd = resolve_identifier(&pool, "MRD002").await.unwrap().unwrap();
        assert_eq!(by_mrd.name, "Vikram Shah");

        assert!(resolve_identifier(&pool, "").await.unwrap().is_none());
        assert!(resolve_identifier(&pool, "GHOST").await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_unassign_unassigned_file_is_reported() {
        let pool = test_pool().await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;

        let result = bulk_unassign_files(&pool, &["UHID0001".to_string()])
            .await
            .unwrap();
        assert_eq!(result.assigned, 0);
        assert_eq!(result.failed[0].reason, "not assigned to any box");
    }

    #[actix_rt::test]
    async fn test_box_delete_blocked_until_empty() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 5).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;

        bulk_assign_files(&pool, &box_id, &["UHID0001".to_string()])
            .await
            .unwrap();

        // Still occupied: delete refused, box and file untouched
        let err = delete_box_record(&pool, &box_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(box_count(&pool, &box_id).await, 1);

        bulk_unassign_files(&pool, &["UHID0001".to_string()])
            .await
            .unwrap();
        delete_box_record(&pool, &box_id).await.unwrap();

        let gone: Option<(String,)> = sqlx::query_as("SELECT id FROM boxes WHERE id = ?")
            .bind(&box_id)
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[actix_rt::test]
    async fn test_full_warehouse_scenario() {
        let pool = test_pool().await;
        let hospital = seed_hospital(&pool).await;
        let rack = seed_rack(&pool, 10).await;
        let box_id = seed_box(&pool, &rack, &hospital, 2).await;
        seed_patient(&pool, "UHID0001", "MRD001", "Asha Rao").await;
        seed_patient(&pool, "UHID0002", "MRD002", "Vikram Shah").await;
        seed_patient(&pool, "UHID0003", "MRD003", "Meera Iyer").await;

        // Fill the box to capacity
        let fill = bulk_assign_files(
            &pool,
            &box_id,
            &["UHID0001".to_string(), "UHID0002".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(fill.assigned, 2);

        // Third file bounces off the full box
        let overflow = bulk_assign_files(&pool, &box_id, &["UHID0003".to_string()])
            .await
            .unwrap();
        assert!(overflow.box_full);
        assert_eq!(overflow.assigned, 0);

        // Close the box: assignment now fails up front
        sqlx::query("UPDATE boxes SET status = 'closed' WHERE id = ?")
            .bind(&box_id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(bulk_assign_files(&pool, &box_id, &["UHID0003".to_string()])
            .await
            .is_err());

        // Unassign still works on a closed box and the box stays closed
        let released = bulk_unassign_files(&pool, &["UHID0001".to_string()])
            .await
            .unwrap();
        assert_eq!(released.assigned, 1);
        assert_eq!(box_count(&pool, &box_id).await, 1);

        let status: (String,) = sqlx::query_as("SELECT status FROM boxes WHERE id = ?")
            .bind(&box_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status.0, "closed");
    }
}
