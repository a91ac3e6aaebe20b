// src/auth.rs
use actix_web::web;
use actix_web::HttpMessage;
use actix_web::{dev::ServiceRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ======== USER MODEL ========

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    /// Hospital scope; NULL for warehouse-wide staff
    pub hospital_id: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

// ======== USER ROLE ========

/// Closed role set. Authorization decisions go through the capability
/// methods below, never through raw string comparison at call sites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Superadmin,
    HospitalAdmin,
    MrdStaff,
    Viewer,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<UserRole>().ok()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Superadmin => "Superadmin",
            UserRole::HospitalAdmin => "Hospital Administrator",
            UserRole::MrdStaff => "MRD Staff",
            UserRole::Viewer => "Viewer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UserRole::Superadmin => "Full access including hospitals and user management",
            UserRole::HospitalAdmin => "Manages racks, boxes and requests for their hospital",
            UserRole::MrdStaff => "Day-to-day warehouse work: assignment, movements, requests",
            UserRole::Viewer => "Read-only access; can raise file requests",
        }
    }

    // ======== USER MANAGEMENT ========
    pub fn can_manage_users(&self) -> bool {
        matches!(self, UserRole::Superadmin)
    }

    pub fn can_view_users(&self) -> bool {
        matches!(self, UserRole::Superadmin | UserRole::HospitalAdmin)
    }

    // ======== HOSPITAL ADMINISTRATION ========
    pub fn can_manage_hospitals(&self) -> bool {
        matches!(self, UserRole::Superadmin)
    }

    // ======== WAREHOUSE STRUCTURE ========
    pub fn can_manage_racks(&self) -> bool {
        matches!(self, UserRole::Superadmin | UserRole::HospitalAdmin)
    }

    pub fn can_manage_boxes(&self) -> bool {
        matches!(
            self,
            UserRole::Superadmin | UserRole::HospitalAdmin | UserRole::MrdStaff
        )
    }

    // ======== FILES ========
    pub fn can_register_patients(&self) -> bool {
        matches!(
            self,
            UserRole::Superadmin | UserRole::HospitalAdmin | UserRole::MrdStaff
        )
    }

    pub fn can_assign_files(&self) -> bool {
        matches!(
            self,
            UserRole::Superadmin | UserRole::HospitalAdmin | UserRole::MrdStaff
        )
    }

    pub fn can_record_movements(&self) -> bool {
        matches!(
            self,
            UserRole::Superadmin | UserRole::HospitalAdmin | UserRole::MrdStaff
        )
    }

    // ======== FILE REQUESTS ========
    /// Every authenticated user may raise a request for a box
    pub fn can_create_requests(&self) -> bool {
        true
    }

    /// Approving, dispatching and closing requests is privileged;
    /// the requester's own cancel is handled separately.
    pub fn can_manage_requests(&self) -> bool {
        matches!(
            self,
            UserRole::Superadmin | UserRole::HospitalAdmin | UserRole::MrdStaff
        )
    }

    // ======== SYSTEM ========
    pub fn can_view_audit_log(&self) -> bool {
        matches!(self, UserRole::Superadmin | UserRole::HospitalAdmin)
    }

    pub fn all_roles() -> Vec<Self> {
        UserRole::iter().collect()
    }
}

// ======== SESSION ========

/// Authorization context built once at the boundary (jwt middleware)
/// and read by every handler. Nothing downstream re-decodes the token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
    pub hospital_id: Option<String>,
}

impl Session {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            username: claims.username.clone(),
            role: claims.role,
            hospital_id: claims.hospital_id.clone(),
        }
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Option<String>,
    pub hospital_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub hospital_id: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        let role = user.get_role();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role,
            hospital_id: user.hospital_id,
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub hospital_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        match validate_password_strength(password) {
            Ok(_) => hash(password, 12),
            Err(e) => Err(bcrypt::BcryptError::InvalidHash(e.to_string())),
        }
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        verify(password, hash)
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.get_role(),
            hospital_id: user.hospital_id.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError("Password must be at least 8 characters".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError("Password must contain at least one uppercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError("Password must contain at least one lowercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError("Password must contain at least one digit".to_string()));
    }
    Ok(())
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn create(
        pool: &SqlitePool,
        request: RegisterRequest,
        role: UserRole,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        validate_password_strength(&request.password)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let password_hash = auth_service.hash_password(&request.password)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))?;

        let user = User {
            id: id.clone(),
            username: request.username,
            email: request.email,
            password_hash,
            role: role.to_string(),
            hospital_id: request.hospital_id,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
            failed_login_attempts: 0,
            locked_until: None,
        };

        sqlx::query(
            r#"INSERT INTO users (
                id, username, email, password_hash, role, hospital_id, is_active,
                created_at, updated_at, failed_login_attempts, locked_until
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .bind(&user.hospital_id)
            .bind(user.is_active as i32)
            .bind(&user.created_at)
            .bind(&user.updated_at)
            .bind(user.failed_login_attempts)
            .bind(&user.locked_until)
            .execute(pool)
            .await?;

        Ok(user)
    }

    pub async fn update_last_login(&self, pool: &SqlitePool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login = datetime('now') WHERE id = ?")
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        pool: &SqlitePool,
        current_password: &str,
        new_password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<()> {
        if !auth_service.verify_password(current_password, &self.password_hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?
        {
            return Err(ApiError::AuthError("Current password is incorrect".to_string()));
        }

        validate_password_strength(new_password)?;

        let new_hash = auth_service.hash_password(new_password)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))?;

        sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?"
        )
            .bind(&new_hash)
            .bind(&self.id)
            .execute(pool)
            .await?;

        Ok(())
    }

    // Lock management
    pub fn is_locked(&self) -> bool {
        if let Some(locked_until) = self.locked_until {
            Utc::now() < locked_until
        } else {
            false
        }
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE users SET failed_login_attempts = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(&mut self, pool: &SqlitePool, duration: Duration) -> ApiResult<()> {
        self.locked_until = Some(Utc::now() + duration);
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(self.locked_until)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?"
        )
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub fn get_role(&self) -> UserRole {
        UserRole::parse(&self.role).unwrap_or(UserRole::Viewer)
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_session(req: &HttpRequest) -> ApiResult<Session> {
    req.extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No session found".to_string()))
}

pub fn check_permission<F>(session: &Session, check: F) -> ApiResult<()>
where
    F: Fn(&UserRole) -> bool,
{
    if check(&session.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

/// Resolve the session and check one capability in a single call
pub fn require_permission(req: &HttpRequest, check: fn(&UserRole) -> bool) -> ApiResult<Session> {
    let session = get_session(req)?;
    check_permission(&session, check)?;
    Ok(session)
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(Session::from_claims(&claims));
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::parse("mrd_staff"), Some(UserRole::MrdStaff));
        assert_eq!(UserRole::parse("hospital_admin"), Some(UserRole::HospitalAdmin));
        assert_eq!(UserRole::parse("nurse"), None);
        assert_eq!(UserRole::Superadmin.to_string(), "superadmin");
    }

    #[test]
    fn test_capability_table() {
        assert!(UserRole::Superadmin.can_manage_hospitals());
        assert!(!UserRole::HospitalAdmin.can_manage_hospitals());
        assert!(UserRole::MrdStaff.can_assign_files());
        assert!(!UserRole::Viewer.can_assign_files());
        assert!(UserRole::Viewer.can_create_requests());
        assert!(!UserRole::Viewer.can_manage_requests());
        assert!(!UserRole::MrdStaff.can_manage_racks());
    }

    #[test]
    fn test_token_round_trip() {
        let service = AuthService::new("a-test-secret-at-least-32-chars!!", 24);
        let user = User {
            id: "u1".to_string(),
            username: "archivist".to_string(),
            email: "archivist@medrec.local".to_string(),
            password_hash: String::new(),
            role: "mrd_staff".to_string(),
            hospital_id: Some("h1".to_string()),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            failed_login_attempts: 0,
            locked_until: None,
        };

        let token = service.generate_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, UserRole::MrdStaff);
        assert_eq!(claims.hospital_id.as_deref(), Some("h1"));

        let session = Session::from_claims(&claims);
        assert_eq!(session.user_id, "u1");
        assert!(session.role.can_assign_files());
    }
}
