// src/error.rs
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

// Generic helpers used all over the handlers
impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    // Warehouse-specific errors
    pub fn rack_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Rack with ID '{}' not found", id))
    }

    pub fn box_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Box with ID '{}' not found", id))
    }

    pub fn hospital_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Hospital with ID '{}' not found", id))
    }

    pub fn box_full(label: &str, capacity: i64) -> Self {
        ApiError::Conflict(format!(
            "Box '{}' is full (capacity {})", label, capacity
        ))
    }

    pub fn box_closed(label: &str) -> Self {
        ApiError::Conflict(format!(
            "Box '{}' is closed. Reopen it before assigning files", label
        ))
    }

    pub fn box_not_empty(label: &str, count: i64) -> Self {
        ApiError::Conflict(format!(
            "Cannot delete box '{}': {} files are still assigned to it", label, count
        ))
    }

    pub fn rack_not_empty(label: &str, count: i64) -> Self {
        ApiError::Conflict(format!(
            "Cannot delete rack '{}': it still holds {} boxes", label, count
        ))
    }

    pub fn rack_full(label: &str, capacity: i64) -> Self {
        ApiError::Conflict(format!(
            "Rack '{}' already holds its maximum of {} boxes", label, capacity
        ))
    }

    pub fn duplicate_label(label: &str) -> Self {
        ApiError::BadRequest(format!("Label '{}' is already in use", label))
    }

    pub fn invalid_status_transition(from: &str, to: &str) -> Self {
        ApiError::Conflict(format!(
            "Invalid request transition: {} -> {}", from, to
        ))
    }
}
