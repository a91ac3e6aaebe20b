// src/patient_handlers.rs
//! Patient file registry. UHID is the permanent identity and never
//! changes; MRD is re-issued on each admission and may be updated.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, LimitQuery};
use crate::models::{PatientRecord, RegisterPatientRequest, UpdatePatientRequest};
use crate::rack_handlers::ensure_hospital_exists;
use crate::AppState;

// ==================== GET PATIENTS ====================

pub async fn get_patients(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let limit = query.normalize(100, 1000);

    let patients: Vec<PatientRecord> = sqlx::query_as(
        "SELECT * FROM patient_records ORDER BY created_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(patients)))
}

// ==================== GET PATIENT BY ID ====================

pub async fn get_patient(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let record_id = path.into_inner();

    let patient: Option<PatientRecord> =
        sqlx::query_as("SELECT * FROM patient_records WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&app_state.db_pool)
            .await?;

    match patient {
        Some(p) => Ok(HttpResponse::Ok().json(ApiResponse::success(p))),
        None => Err(ApiError::not_found("Patient record")),
    }
}

// ==================== REGISTER PATIENT ====================

pub async fn register_patient(
    app_state: web::Data<Arc<AppState>>,
    patient: web::Json<RegisterPatientRequest>,
) -> ApiResult<HttpResponse> {
    patient.validate()?;
    let pool = &app_state.db_pool;

    if let Some(ref hospital_id) = patient.hospital_id {
        ensure_hospital_exists(pool, hospital_id).await?;
    }

    let uhid = patient.uhid.trim().to_uppercase();
    let mrd = patient.mrd.trim().to_uppercase();

    let existing: Option<(i64, String)> =
        sqlx::query_as("SELECT id, uhid FROM patient_records WHERE uhid = ? OR mrd = ?")
            .bind(&uhid)
            .bind(&mrd)
            .fetch_optional(pool)
            .await?;
    if let Some((_, taken_uhid)) = existing {
        let field = if taken_uhid == uhid { "UHID" } else { "MRD" };
        return Err(ApiError::Conflict(format!(
            "A patient record with this {} already exists",
            field
        )));
    }

    let now = Utc::now();
    let result = sqlx::query(
        r#"INSERT INTO patient_records (uhid, mrd, name, hospital_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&uhid)
    .bind(&mrd)
    .bind(patient.name.trim())
    .bind(&patient.hospital_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let created: PatientRecord = sqlx::query_as("SELECT * FROM patient_records WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;

    info!("🧾 Registered patient file {} ({})", created.uhid, created.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== UPDATE PATIENT ====================

pub async fn update_patient(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    update: web::Json<UpdatePatientRequest>,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let record_id = path.into_inner();
    let pool = &app_state.db_pool;

    let existing: Option<PatientRecord> =
        sqlx::query_as("SELECT * FROM patient_records WHERE id = ?")
            .bind(record_id)
            .fetch_optional(pool)
            .await?;
    let existing = existing.ok_or_else(|| ApiError::not_found("Patient record"))?;

    let mrd = match update.mrd {
        Some(ref m) => {
            let mrd = m.trim().to_uppercase();
            if mrd != existing.mrd {
                let taken: Option<(i64,)> =
                    sqlx::query_as("SELECT id FROM patient_records WHERE mrd = ? AND id != ?")
                        .bind(&mrd)
                        .bind(record_id)
                        .fetch_optional(pool)
                        .await?;
                if taken.is_some() {
                    return Err(ApiError::Conflict(
                        "A patient record with this MRD already exists".to_string(),
                    ));
                }
            }
            mrd
        }
        None => existing.mrd.clone(),
    };

    if let Some(ref hospital_id) = update.hospital_id {
        ensure_hospital_exists(pool, hospital_id).await?;
    }

    let name = update
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&existing.name);
    let hospital_id = update.hospital_id.clone().or(existing.hospital_id.clone());

    sqlx::query(
        "UPDATE patient_records SET mrd = ?, name = ?, hospital_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&mrd)
    .bind(name)
    .bind(&hospital_id)
    .bind(Utc::now())
    .bind(record_id)
    .execute(pool)
    .await?;

    let updated: PatientRecord = sqlx::query_as("SELECT * FROM patient_records WHERE id = ?")
        .bind(record_id)
        .fetch_one(pool)
        .await?;

    info!("🧾 Updated patient file {} ({})", updated.uhid, record_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}
