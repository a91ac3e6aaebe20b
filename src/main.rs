// Hospital medical-records warehouse backend
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpRequest, HttpResponse, HttpServer,
};
use actix_cors::Cors;
use actix_web::http::header;
use actix_web_httpauth::middleware::HttpAuthentication;
use anyhow::Context;
use rand::{distributions::Alphanumeric, seq::SliceRandom, thread_rng, Rng};
use rand::distributions::Distribution;
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteConnectOptions, Sqlite, SqlitePool};
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod assignment_handlers;
mod audit;
mod auth;
mod auth_handlers;
mod box_handlers;
mod config;
mod db;
mod error;
mod handlers;
mod hospital_handlers;
mod models;
mod movement_handlers;
mod patient_handlers;
mod rack_handlers;
mod request_handlers;
mod search_handlers;

use crate::audit::ChangeSet;
use crate::auth::{get_session, jwt_middleware, require_permission, AuthService, UserRole};
use crate::config::{load_config, Config};
use crate::error::ApiResult;
use crate::handlers::{get_dashboard_stats, get_recent_activity};
use crate::models::{
    BulkAssignRequest, BulkUnassignRequest, CreateBoxRequest, CreateFileRequestRequest,
    CreateHospitalRequest, CreateRackRequest, RecordMovementRequest, RegisterPatientRequest,
    SetBoxStatusRequest, UpdateBoxRequest, UpdateHospitalRequest, UpdatePatientRequest,
    UpdateRackRequest, UpdateRequestStatusRequest,
};

use auth_handlers::{
    change_password, change_user_password, create_user, delete_user, get_profile, get_roles,
    get_user, get_users, login, logout, register, update_user,
};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

// ==================== RACK PROTECTED WRAPPERS ====================

async fn create_rack_protected(
    app_state: web::Data<Arc<AppState>>,
    rack: web::Json<CreateRackRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_racks())?;

    let mut cs = ChangeSet::new();
    if let Some(ref label) = rack.label {
        cs.created("label", label);
    }
    cs.created("aisle", &rack.aisle.to_string());
    cs.created("capacity", &rack.capacity.to_string());

    let response =
        rack_handlers::create_rack(app_state.clone(), rack, session.user_id.clone()).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "create", "rack", "",
        &format!("Created rack: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_rack_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRackRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_racks())?;
    let rack_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, i64)>(
        "SELECT label, capacity FROM racks WHERE id = ?",
    )
    .bind(&rack_id)
    .fetch_one(&app_state.db_pool)
    .await
    {
        if let Some(ref new_label) = update.label {
            cs.add("label", &old.0, new_label);
        }
        if let Some(new_capacity) = update.capacity {
            cs.add_i64("capacity", old.1, new_capacity);
        }
    }

    let response = rack_handlers::update_rack(
        app_state.clone(),
        web::Path::from(rack_id.clone()),
        update,
        session.user_id.clone(),
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "edit", "rack", &rack_id,
        &format!("Rack {} updated: {}", rack_id, cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn delete_rack_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_racks())?;
    let rack_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String,)>("SELECT label FROM racks WHERE id = ?")
        .bind(&rack_id)
        .fetch_one(&app_state.db_pool)
        .await
    {
        cs.deleted("label", &old.0);
    }

    let response =
        rack_handlers::delete_rack(app_state.clone(), web::Path::from(rack_id.clone())).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "delete", "rack", &rack_id,
        &format!("Deleted rack: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== BOX PROTECTED WRAPPERS ====================

async fn create_box_protected(
    app_state: web::Data<Arc<AppState>>,
    box_req: web::Json<CreateBoxRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_boxes())?;

    let mut cs = ChangeSet::new();
    cs.created("rack_id", &box_req.rack_id);
    cs.created("category", &box_req.category);
    cs.created("capacity", &box_req.capacity.to_string());

    let response =
        box_handlers::create_box(app_state.clone(), box_req, session.user_id.clone()).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "create", "box", "",
        &format!("Created box: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_box_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateBoxRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_boxes())?;
    let box_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, i64)>(
        "SELECT label, capacity FROM boxes WHERE id = ?",
    )
    .bind(&box_id)
    .fetch_one(&app_state.db_pool)
    .await
    {
        if let Some(ref new_label) = update.label {
            cs.add("label", &old.0, new_label);
        }
        if let Some(new_capacity) = update.capacity {
            cs.add_i64("capacity", old.1, new_capacity);
        }
    }

    let response = box_handlers::update_box(
        app_state.clone(),
        web::Path::from(box_id.clone()),
        update,
        session.user_id.clone(),
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "edit", "box", &box_id,
        &format!("Box {} updated: {}", box_id, cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn set_box_status_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    status_req: web::Json<SetBoxStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_boxes())?;
    let box_id = path.into_inner();
    let target = if status_req.open { "open" } else { "closed" };

    let response = box_handlers::set_box_status(
        app_state.clone(),
        web::Path::from(box_id.clone()),
        status_req,
        session.user_id.clone(),
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "edit", "box", &box_id,
        &format!("Box {} set to {}", box_id, target),
        &http_request,
    ).await;
    Ok(response)
}

async fn delete_box_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_boxes())?;
    let box_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, String)>(
        "SELECT label, status FROM boxes WHERE id = ?",
    )
    .bind(&box_id)
    .fetch_one(&app_state.db_pool)
    .await
    {
        cs.deleted("label", &old.0);
        cs.deleted("status", &old.1);
    }

    let response =
        box_handlers::delete_box(app_state.clone(), web::Path::from(box_id.clone())).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "delete", "box", &box_id,
        &format!("Deleted box: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== ASSIGNMENT PROTECTED WRAPPERS ====================

async fn bulk_assign_protected(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<BulkAssignRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_assign_files())?;
    let box_id = request.box_id.clone();
    let batch_size = request.identifiers.len();

    let response = assignment_handlers::bulk_assign(app_state.clone(), request).await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "assign", "box", &box_id,
        &format!("Bulk assign of {} identifiers", batch_size),
        &http_request,
    ).await;
    Ok(response)
}

async fn bulk_unassign_protected(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<BulkUnassignRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_assign_files())?;
    let batch_size = request.identifiers.len();

    let response = assignment_handlers::bulk_unassign(app_state.clone(), request).await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "unassign", "box", "",
        &format!("Bulk unassign of {} identifiers", batch_size),
        &http_request,
    ).await;
    Ok(response)
}

// ==================== MOVEMENT PROTECTED WRAPPERS ====================

async fn record_movement_protected(
    app_state: web::Data<Arc<AppState>>,
    movement: web::Json<RecordMovementRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_record_movements())?;
    let summary = format!(
        "{} {} -> {}",
        movement.movement_type, movement.uhid, movement.dest
    );

    let response =
        movement_handlers::record_movement(app_state.clone(), movement, session.user_id.clone())
            .await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "create", "movement", "",
        &summary, &http_request,
    ).await;
    Ok(response)
}

// ==================== REQUEST PROTECTED WRAPPERS ====================

async fn get_requests_protected(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    request_handlers::get_requests(app_state, session).await
}

async fn create_request_protected(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateFileRequestRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    request_handlers::create_request(app_state, request, session).await
}

async fn update_request_status_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRequestStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_requests())?;
    let request_id = path.into_inner();
    let new_status = update.status.clone();

    let response = request_handlers::update_request_status(
        app_state.clone(),
        web::Path::from(request_id.clone()),
        update,
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "edit", "file_request", &request_id,
        &format!("Request status set to {}", new_status),
        &http_request,
    ).await;
    Ok(response)
}

async fn cancel_request_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = get_session(&http_request)?;
    let request_id = path.into_inner();
    let user_id = session.user_id.clone();

    let response = request_handlers::cancel_request(
        app_state.clone(),
        web::Path::from(request_id.clone()),
        session,
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &user_id, "cancel", "file_request", &request_id,
        "Request cancelled", &http_request,
    ).await;
    Ok(response)
}

// ==================== PATIENT PROTECTED WRAPPERS ====================

async fn register_patient_protected(
    app_state: web::Data<Arc<AppState>>,
    patient: web::Json<RegisterPatientRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_register_patients())?;

    let mut cs = ChangeSet::new();
    cs.created("uhid", &patient.uhid);
    cs.created("mrd", &patient.mrd);
    cs.created("name", &patient.name);

    let response = patient_handlers::register_patient(app_state.clone(), patient).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "create", "patient_record", "",
        &format!("Registered patient file: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_patient_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    update: web::Json<UpdatePatientRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_register_patients())?;
    let record_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, String)>(
        "SELECT mrd, name FROM patient_records WHERE id = ?",
    )
    .bind(record_id)
    .fetch_one(&app_state.db_pool)
    .await
    {
        if let Some(ref new_mrd) = update.mrd {
            cs.add("mrd", &old.0, new_mrd);
        }
        if let Some(ref new_name) = update.name {
            cs.add("name", &old.1, new_name);
        }
    }

    let response = patient_handlers::update_patient(
        app_state.clone(),
        web::Path::from(record_id),
        update,
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "edit", "patient_record",
        &record_id.to_string(),
        &format!("Patient file {} updated: {}", record_id, cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== HOSPITAL PROTECTED WRAPPERS ====================

async fn create_hospital_protected(
    app_state: web::Data<Arc<AppState>>,
    hospital: web::Json<CreateHospitalRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_hospitals())?;

    let mut cs = ChangeSet::new();
    cs.created("name", &hospital.name);
    cs.created("prefix", &hospital.prefix);

    let response = hospital_handlers::create_hospital(app_state.clone(), hospital).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &session.user_id, "create", "hospital", "",
        &format!("Created hospital: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_hospital_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateHospitalRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_hospitals())?;
    let hospital_id = path.into_inner();

    let response = hospital_handlers::update_hospital(
        app_state.clone(),
        web::Path::from(hospital_id.clone()),
        update,
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "edit", "hospital", &hospital_id,
        "Hospital updated", &http_request,
    ).await;
    Ok(response)
}

async fn delete_hospital_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let session = require_permission(&http_request, |role| role.can_manage_hospitals())?;
    let hospital_id = path.into_inner();

    let response = hospital_handlers::delete_hospital(
        app_state.clone(),
        web::Path::from(hospital_id.clone()),
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &session.user_id, "delete", "hospital", &hospital_id,
        "Hospital deleted", &http_request,
    ).await;
    Ok(response)
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
    ));

    create_default_admin_if_needed(&pool, &auth_service).await?;

    config.print_startup_info();

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("🏥 Starting medrec server at http://{}", bind_address);

    let workers = config.server.workers;
    let mut server = HttpServer::new(move || {
        let cors = setup_improved_cors(&config.security.allowed_origins);
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))

            // Health check (no auth)
            .service(
                web::scope("/health")
                    .route("", web::get().to(|| async { HttpResponse::Ok().body("OK") }))
            )

            // Auth endpoints (no authentication required)
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
            )

            // Protected API endpoints
            .service(
                web::scope("/api/v1")
                    .wrap(auth_middleware)

                    // Auth management
                    .service(
                        web::scope("/auth")
                            .route("/profile", web::get().to(get_profile))
                            .route("/change-password", web::post().to(change_password))
                            .route("/logout", web::post().to(logout))
                            .route("/roles", web::get().to(get_roles))
                            .route("/users", web::get().to(get_users))
                            .route("/users", web::post().to(create_user))
                            .route("/users/{id}", web::get().to(get_user))
                            .route("/users/{id}", web::put().to(update_user))
                            .route("/users/{id}", web::delete().to(delete_user))
                            .route("/users/{id}/reset-password", web::put().to(change_user_password))
                    )

                    // Dashboard
                    .service(
                        web::scope("/dashboard")
                            .route("/stats", web::get().to(get_dashboard_stats))
                            .route("/recent-activity", web::get().to(get_recent_activity))
                    )

                    // Hospitals
                    .service(
                        web::scope("/hospitals")
                            .route("", web::get().to(hospital_handlers::get_hospitals))
                            .route("", web::post().to(create_hospital_protected))
                            .route("/{id}", web::put().to(update_hospital_protected))
                            .route("/{id}", web::delete().to(delete_hospital_protected))
                    )

                    // Patient file registry
                    .service(
                        web::scope("/patients")
                            .route("", web::get().to(patient_handlers::get_patients))
                            .route("", web::post().to(register_patient_protected))
                            .route("/{id}", web::get().to(patient_handlers::get_patient))
                            .route("/{id}", web::patch().to(update_patient_protected))
                    )

                    // Warehouse storage
                    .service(
                        web::scope("/storage")
                            // Racks
                            .route("/racks", web::get().to(rack_handlers::get_all_racks))
                            .route("/racks", web::post().to(create_rack_protected))
                            .route("/racks/{id}", web::get().to(rack_handlers::get_rack))
                            .route("/racks/{id}", web::patch().to(update_rack_protected))
                            .route("/racks/{id}", web::delete().to(delete_rack_protected))

                            // Boxes
                            .route("/boxes", web::get().to(box_handlers::get_boxes))
                            .route("/boxes", web::post().to(create_box_protected))
                            .route("/next-sequence", web::get().to(box_handlers::get_next_sequence))
                            .route("/boxes/{id}", web::get().to(box_handlers::get_box))
                            .route("/boxes/{id}", web::patch().to(update_box_protected))
                            .route("/boxes/{id}", web::delete().to(delete_box_protected))
                            .route("/boxes/{id}/status", web::patch().to(set_box_status_protected))
                            .route("/boxes/{id}/patients", web::get().to(box_handlers::get_box_patients))

                            // File assignment
                            .route("/files/bulk-assign", web::post().to(bulk_assign_protected))
                            .route("/files/bulk-unassign", web::post().to(bulk_unassign_protected))

                            // Movement ledger
                            .route("/move", web::post().to(record_movement_protected))
                            .route("/logs", web::get().to(movement_handlers::get_movement_logs))

                            // File requests
                            .route("/requests", web::get().to(get_requests_protected))
                            .route("/requests", web::post().to(create_request_protected))
                            .route("/requests/{id}/status", web::patch().to(update_request_status_protected))
                            .route("/requests/{id}", web::delete().to(cancel_request_protected))

                            // Locator
                            .route("/search", web::get().to(search_handlers::search_files))
                            .route("/layout", web::get().to(search_handlers::get_layout))
                    )
            )
    });

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

pub fn setup_improved_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::USER_AGENT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    let is_production = env::var("MEDREC_ENV").as_deref() == Ok("production");

    if allowed_origins.contains(&"*".to_string()) {
        if is_production {
            log::error!("❌ Wildcard CORS origin (*) is not allowed in production");
            panic!("Cannot start server with wildcard CORS in production");
        }
        log::warn!("⚠️ Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret.len() < 32 {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }

    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(
    db_config: &crate::config::DatabaseConfig,
) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_config.url.trim_start_matches("sqlite:"))
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload",
        ));
    }

    headers
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 == 0 {
        use crate::auth::RegisterRequest;

        let password = env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| {
            let mut rng = thread_rng();
            let digits: Vec<char> = "0123456789".chars().collect();
            let specials: Vec<char> = "!@#$%^&*()_+-=[]{}|;:,.<>?".chars().collect();
            let uppercase: Vec<char> = "ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().collect();
            let lowercase: Vec<char> = "abcdefghijklmnopqrstuvwxyz".chars().collect();

            // One of each required class, padded with random filler
            let mut pwd_chars: Vec<char> = vec![
                *digits.choose(&mut rng).unwrap(),
                *specials.choose(&mut rng).unwrap(),
                *uppercase.choose(&mut rng).unwrap(),
                *lowercase.choose(&mut rng).unwrap(),
            ];

            for _ in 0..8 {
                if rng.gen_bool(0.5) {
                    let sample_u8 = Alphanumeric.sample(&mut rng);
                    pwd_chars.push(char::from(sample_u8));
                } else {
                    pwd_chars.push(*digits.choose(&mut rng).unwrap());
                }
            }

            pwd_chars.shuffle(&mut rng);
            let pwd: String = pwd_chars.into_iter().collect();
            log::warn!("Generated admin password: {}", pwd);
            pwd
        });

        let admin_request = RegisterRequest {
            username: "admin".to_string(),
            email: "admin@medrec.local".to_string(),
            password: password.clone(),
            role: None,
            hospital_id: None,
        };

        let user = crate::auth::User::create(pool, admin_request, UserRole::Viewer, auth_service)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create default admin user: {}", e))?;

        let update_result = sqlx::query(
            "UPDATE users SET role = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(UserRole::Superadmin.to_string())
        .bind(&user.id)
        .execute(pool)
        .await?;

        if update_result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Failed to promote default user to superadmin"));
        }

        log::warn!("Default superadmin created:");
        log::warn!("  Username: admin");
        log::warn!("  Password: {} (generated - CHANGE IMMEDIATELY!)", password);
    }

    Ok(())
}
