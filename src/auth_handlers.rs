// src/auth_handlers.rs - Authentication route handlers

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    check_permission, get_session, AuthService, ChangePasswordRequest, LoginRequest,
    LoginResponse, RegisterRequest, User, UserInfo, UserRole,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::AppState;

// ======== REQUEST STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub hospital_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeUserPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
    pub hospital_id: Option<String>,
}

// ======== AUTH HANDLERS ========

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let mut user = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid username or password".to_string()))?;

    if user.is_locked() {
        return Err(ApiError::AuthError(
            "Account is temporarily locked. Try again later.".to_string(),
        ));
    }

    if !auth_service
        .verify_password(&request.password, &user.password_hash)
        .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?
    {
        user.increment_failed_attempts(&app_state.db_pool).await?;

        let max_attempts = app_state.config.auth.max_login_attempts;
        if user.failed_login_attempts >= max_attempts {
            let lockout = app_state.config.auth.lockout_duration_minutes as i64;
            user.lock_for_duration(&app_state.db_pool, Duration::minutes(lockout))
                .await?;
            return Err(ApiError::AuthError(format!(
                "Account locked due to too many failed attempts. Try again in {} minutes.",
                lockout
            )));
        }

        return Err(ApiError::BadRequest("Invalid username or password".to_string()));
    }

    // Expired locks are cleared on successful login
    if let Some(locked_until) = user.locked_until {
        if Utc::now() > locked_until {
            user.reset_failed_attempts(&app_state.db_pool).await?;
        }
    }

    user.reset_failed_attempts(&app_state.db_pool).await?;
    user.update_last_login(&app_state.db_pool).await?;

    let token = auth_service.generate_token(&user)?;

    let response = LoginResponse {
        token,
        expires_in: app_state.config.auth.token_expiration_hours * 3600,
        user: user.clone().into(),
    };

    log::info!("User {} logged in successfully", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    // Self-registration yields Viewer; only a superadmin may pick a role
    let role = if let Ok(session) = get_session(&http_request) {
        check_permission(&session, |role| role.can_manage_users())?;
        request
            .role
            .as_deref()
            .and_then(UserRole::parse)
            .unwrap_or(UserRole::Viewer)
    } else {
        if !app_state.config.auth.allow_self_registration {
            return Err(ApiError::Forbidden(
                "Self-registration is disabled".to_string(),
            ));
        }
        UserRole::Viewer
    };

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(&request.username)
            .bind(&request.email)
            .fetch_optional(&app_state.db_pool)
            .await?;

    if existing.is_some() {
        return Err(ApiError::BadRequest(
            "Username or email already registered".to_string(),
        ));
    }

    let user = User::create(
        &app_state.db_pool,
        request.into_inner(),
        role,
        &auth_service,
    )
    .await?;

    log::info!("👤 Registered user {} ({})", user.username, user.role);

    Ok(HttpResponse::Created().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &session.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let session = get_session(&http_request)?;

    let user = User::find_by_id(&app_state.db_pool, &session.user_id).await?;
    user.change_password(
        &app_state.db_pool,
        &request.current_password,
        &request.new_password,
        &auth_service,
    )
    .await?;

    log::info!("🔑 Password changed for {}", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

// JWT tokens are stateless - logout is handled client-side by removing the token
pub async fn logout(_http_request: HttpRequest) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_with_message(
        (),
        "Logged out successfully".to_string(),
    )))
}

// ======== USER MANAGEMENT ========

pub async fn get_users(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_view_users())?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY username ASC")
        .fetch_all(&app_state.db_pool)
        .await?;

    let infos: Vec<UserInfo> = users.into_iter().map(UserInfo::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(infos)))
}

pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_view_users())?;

    let user = User::find_by_id(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<CreateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_manage_users())?;

    let role = UserRole::parse(&request.role)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", request.role)))?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(&request.username)
            .bind(&request.email)
            .fetch_optional(&app_state.db_pool)
            .await?;

    if existing.is_some() {
        return Err(ApiError::BadRequest(
            "Username or email already registered".to_string(),
        ));
    }

    let request = request.into_inner();
    let user = User::create(
        &app_state.db_pool,
        RegisterRequest {
            username: request.username,
            email: request.email,
            password: request.password,
            role: None,
            hospital_id: request.hospital_id,
        },
        role,
        &auth_service,
    )
    .await?;

    log::info!("👤 Created user {} with role {}", user.username, user.role);
    Ok(HttpResponse::Created().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn update_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_manage_users())?;

    let user_id = path.into_inner();
    let existing = User::find_by_id(&app_state.db_pool, &user_id).await?;

    // Nobody demotes themselves away from user management
    if user_id == session.user_id {
        if let Some(ref new_role) = request.role {
            if UserRole::parse(new_role).map(|r| !r.can_manage_users()).unwrap_or(true) {
                return Err(ApiError::BadRequest(
                    "Cannot remove your own user-management role".to_string(),
                ));
            }
        }
    }

    let role = match request.role.as_deref() {
        Some(r) => UserRole::parse(r)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", r)))?
            .to_string(),
        None => existing.role.clone(),
    };
    let hospital_id = request.hospital_id.clone().or(existing.hospital_id);
    let is_active = request.is_active.unwrap_or(existing.is_active);

    sqlx::query(
        "UPDATE users SET role = ?, hospital_id = ?, is_active = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(&role)
    .bind(&hospital_id)
    .bind(is_active as i32)
    .bind(&user_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated = User::find_by_id(&app_state.db_pool, &user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(updated))))
}

pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_manage_users())?;

    let user_id = path.into_inner();
    if user_id == session.user_id {
        return Err(ApiError::BadRequest("Cannot delete your own account".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }

    log::info!("👤 Deleted user {}", user_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "User deleted successfully".to_string(),
    )))
}

pub async fn change_user_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    path: web::Path<String>,
    request: web::Json<ChangeUserPasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_manage_users())?;

    let user_id = path.into_inner();
    User::find_by_id(&app_state.db_pool, &user_id).await?;

    let new_hash = auth_service
        .hash_password(&request.new_password)
        .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(&new_hash)
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password reset successfully".to_string(),
    )))
}

// ======== ROLES ========

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub value: String,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub async fn get_roles(http_request: HttpRequest) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    check_permission(&session, |role| role.can_view_users())?;

    let roles: Vec<RoleInfo> = UserRole::all_roles()
        .into_iter()
        .map(|r| RoleInfo {
            value: r.to_string(),
            display_name: r.display_name(),
            description: r.description(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}
