// src/db.rs - Database migrations and setup

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Users
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'viewer' CHECK(
                role IN ('superadmin', 'hospital_admin', 'mrd_staff', 'viewer')
            ),
            hospital_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_login DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME,
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Hospitals (prefix feeds generated box labels)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hospitals (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            prefix TEXT NOT NULL UNIQUE CHECK(length(prefix) >= 2 AND length(prefix) <= 6),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Racks. hospital_id NULL = shared rack
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS racks (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL CHECK(length(label) > 0 AND length(label) <= 50),
            aisle INTEGER NOT NULL CHECK(aisle >= 0),
            capacity INTEGER NOT NULL CHECK(capacity >= 1),
            hospital_id TEXT,
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id),
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id),
            UNIQUE(aisle, label)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Boxes. Deleting a rack with boxes is rejected in the handler,
    // RESTRICT here is the backstop.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS boxes (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL UNIQUE CHECK(length(label) > 0 AND length(label) <= 50),
            rack_id TEXT NOT NULL,
            capacity INTEGER NOT NULL CHECK(capacity >= 1),
            status TEXT NOT NULL DEFAULT 'open' CHECK(status IN ('open', 'closed')),
            category TEXT NOT NULL CHECK(category IN ('IPD', 'OPD', 'MLC', 'BIRTH', 'DEATH')),
            hospital_id TEXT NOT NULL,
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (rack_id) REFERENCES racks (id) ON DELETE RESTRICT,
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id),
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Per-(hospital, category) label counters. The server is the sole
    // allocator: the bump happens inside the box-create transaction.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS box_sequences (
            hospital_id TEXT NOT NULL,
            category TEXT NOT NULL,
            next_seq INTEGER NOT NULL DEFAULT 1 CHECK(next_seq >= 1),
            PRIMARY KEY (hospital_id, category),
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Patient file records. Integer rowid doubles as the record_id
    // accepted by the assignment engine. box_id NULL = unassigned.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patient_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uhid TEXT NOT NULL UNIQUE CHECK(length(uhid) >= 4 AND length(uhid) <= 32),
            mrd TEXT NOT NULL UNIQUE CHECK(length(mrd) >= 3 AND length(mrd) <= 32),
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            hospital_id TEXT,
            box_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id),
            FOREIGN KEY (box_id) REFERENCES boxes (id) ON DELETE RESTRICT
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Movement ledger: append-only, no UPDATE/DELETE path exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movement_logs (
            id TEXT PRIMARY KEY,
            movement_type TEXT NOT NULL CHECK(movement_type IN ('CHECK-IN', 'CHECK-OUT')),
            uhid TEXT NOT NULL CHECK(length(uhid) > 0 AND length(uhid) <= 50),
            patient_name TEXT NOT NULL CHECK(length(patient_name) > 0 AND length(patient_name) <= 255),
            destination TEXT NOT NULL CHECK(length(destination) > 0 AND length(destination) <= 255),
            status TEXT NOT NULL DEFAULT 'completed',
            recorded_by TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (recorded_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // File requests
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_requests (
            id TEXT PRIMARY KEY,
            box_id TEXT NOT NULL,
            requester_id TEXT NOT NULL,
            requester_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'approved', 'in_transit', 'delivered',
                           'return_requested', 'returned', 'rejected', 'cancelled')
            ),
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 500),
            request_date DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (box_id) REFERENCES boxes (id),
            FOREIGN KEY (requester_id) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            changes TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    create_indexes(pool).await?;

    log::info!("✅ Database migrations completed");
    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_boxes_rack ON boxes (rack_id)",
        "CREATE INDEX IF NOT EXISTS idx_boxes_hospital ON boxes (hospital_id)",
        "CREATE INDEX IF NOT EXISTS idx_patient_records_box ON patient_records (box_id)",
        "CREATE INDEX IF NOT EXISTS idx_patient_records_name ON patient_records (name)",
        "CREATE INDEX IF NOT EXISTS idx_movement_logs_created ON movement_logs (created_at)",
        "CREATE INDEX IF NOT EXISTS idx_file_requests_status ON file_requests (status)",
        "CREATE INDEX IF NOT EXISTS idx_file_requests_requester ON file_requests (requester_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs (created_at)",
    ];

    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // A single connection keeps the in-memory database alive and visible
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}
