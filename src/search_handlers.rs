// src/search_handlers.rs
//! Warehouse locator: partial name / UHID / MRD to a physical shelf
//! position, plus the full rack-to-box layout tree.

use actix_web::{web, HttpResponse};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{LayoutBox, LocatorHit, RackLayout, SearchQuery};
use crate::AppState;

// ==================== SEARCH ====================

pub async fn search_files(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let hits = locate_files(&app_state.db_pool, &q, limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(hits)))
}

/// Queries shorter than 2 characters return empty without touching the
/// database.
pub async fn locate_files(
    pool: &SqlitePool,
    q: &str,
    limit: i64,
) -> Result<Vec<LocatorHit>, sqlx::Error> {
    if q.chars().count() < 2 {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", q.replace('%', "").replace('_', ""));

    // Only assigned files have a shelf position to report
    sqlx::query_as(
        r#"SELECT p.id AS record_id, p.name, p.uhid, p.mrd,
                  r.aisle, r.label AS rack_label, b.label AS box_label, b.id AS box_id
           FROM patient_records p
           JOIN boxes b ON b.id = p.box_id
           JOIN racks r ON r.id = b.rack_id
           WHERE p.name LIKE ? COLLATE NOCASE
              OR p.uhid LIKE ? COLLATE NOCASE
              OR p.mrd LIKE ? COLLATE NOCASE
           ORDER BY p.name ASC
           LIMIT ?"#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// ==================== LAYOUT ====================

pub async fn get_layout(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let layout = build_layout(&app_state.db_pool).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(layout)))
}

pub async fn build_layout(pool: &SqlitePool) -> Result<Vec<RackLayout>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct RackRow {
        id: String,
        label: String,
        aisle: i64,
        capacity: i64,
    }

    let racks: Vec<RackRow> = sqlx::query_as(
        "SELECT id, label, aisle, capacity FROM racks ORDER BY aisle ASC, label ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut layout = Vec::with_capacity(racks.len());
    for rack in racks {
        let boxes: Vec<LayoutBox> = sqlx::query_as(
            r#"SELECT b.id AS box_id, b.label AS box_label, b.category, b.status, b.capacity,
                      (SELECT COUNT(*) FROM patient_records p WHERE p.box_id = b.id) AS patient_count
               FROM boxes b
               WHERE b.rack_id = ?
               ORDER BY b.label ASC"#,
        )
        .bind(&rack.id)
        .fetch_all(pool)
        .await?;

        layout.push(RackLayout {
            rack_id: rack.id,
            rack_label: rack.label,
            aisle: rack.aisle,
            capacity: rack.capacity,
            boxes,
        });
    }

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_assigned_patient(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO hospitals (id, name, prefix, created_at, updated_at)
             VALUES ('hosp-1', 'General Hospital', 'GH', datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO racks (id, label, aisle, capacity, created_at, updated_at)
             VALUES ('rack-1', 'A2-R1', 2, 10, datetime('now'), datetime('now'))",
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
        sqlx::query(
            "INSERT INTO patient_records (uhid, mrd, name, box_id, created_at, updated_at)
             VALUES ('UHID0001', 'MRD001', 'Asha Rao', 'box-1', datetime('now'), datetime('now'))",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[actix_rt::test]
    async fn test_short_query_returns_empty() {
        let pool = test_pool().await;
        seed_assigned_patient(&pool).await;

        assert!(locate_files(&pool, "", 50).await.unwrap().is_empty());
        assert!(locate_files(&pool, "A", 50).await.unwrap().is_empty());
        assert_eq!(locate_files(&pool, "As", 50).await.unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn test_search_resolves_location() {
        let pool = test_pool().await;
        seed_assigned_patient(&pool).await;

        let hits = locate_files(&pool, "asha", 50).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].aisle, 2);
        assert_eq!(hits[0].rack_label, "A2-R1");
        assert_eq!(hits[0].box_label, "GH-IPD-001");

        // UHID and MRD fragments hit the same record
        assert_eq!(locate_files(&pool, "HID000", 50).await.unwrap().len(), 1);
        assert_eq!(locate_files(&pool, "MRD001", 50).await.unwrap().len(), 1);
        assert!(locate_files(&pool, "nobody", 50).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_unassigned_files_have_no_location() {
        let pool = test_pool().await;
        seed_assigned_patient(&pool).await;
        sqlx::query(
            "INSERT INTO patient_records (uhid, mrd, name, created_at, updated_at)
             VALUES ('UHID0002', 'MRD002', 'Vikram Shah', datetime('now'), datetime('now'))",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(locate_files(&pool, "Vikram", 50).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_layout_tree() {
        let pool = test_pool().await;
        seed_assigned_patient(&pool).await;

        let layout = build_layout(&pool).await.unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].boxes.len(), 1);
        assert_eq!(layout[0].boxes[0].patient_count, 1);
        assert_eq!(layout[0].boxes[0].box_label, "GH-IPD-001");
    }
}
