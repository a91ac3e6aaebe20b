// src/audit.rs - Audit trail helpers

use actix_web::HttpRequest;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Write one event to audit_logs
pub async fn log_activity(
    pool: &SqlitePool,
    user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    description: Option<&str>,
    changes: Option<&str>,
    request: Option<&HttpRequest>,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let ip_address = request.and_then(|req| {
        req.connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string())
    });

    let user_agent = request.and_then(|req| {
        req.headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    });

    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, user_id, action, entity_type, entity_id, description, changes, ip_address, user_agent, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    )
    .bind(&id)
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(changes)
    .bind(&ip_address)
    .bind(&user_agent)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Short form for frequent call sites. Audit failures are logged, never
/// surfaced: the user action itself already succeeded.
pub async fn audit(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
    request: &HttpRequest,
) {
    if let Err(e) = log_activity(
        pool,
        Some(user_id),
        action,
        entity_type,
        Some(entity_id),
        Some(description),
        None,
        Some(request),
    ).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

/// Variant carrying a structured field-change list
pub async fn audit_with_changes(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
    changes: &ChangeSet,
    request: &HttpRequest,
) {
    let changes_json = if changes.has_changes() {
        changes.to_json().ok()
    } else {
        None
    };

    if let Err(e) = log_activity(
        pool,
        Some(user_id),
        action,
        entity_type,
        Some(entity_id),
        Some(description),
        changes_json.as_deref(),
        Some(request),
    ).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

// ==================== CHANGESET ====================

#[derive(Debug, Serialize)]
struct FieldChange {
    field: String,
    old: Option<String>,
    new: Option<String>,
}

/// Collects per-field before/after values for an audit entry
#[derive(Debug, Default, Serialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self, field: &str, value: &str) {
        self.changes.push(FieldChange {
            field: field.to_string(),
            old: None,
            new: Some(value.to_string()),
        });
    }

    pub fn deleted(&mut self, field: &str, value: &str) {
        self.changes.push(FieldChange {
            field: field.to_string(),
            old: Some(value.to_string()),
            new: None,
        });
    }

    pub fn add(&mut self, field: &str, old: &str, new: &str) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old: Some(old.to_string()),
                new: Some(new.to_string()),
            });
        }
    }

    pub fn add_opt(&mut self, field: &str, old: &Option<String>, new: &Option<String>) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old: old.clone(),
                new: new.clone(),
            });
        }
    }

    pub fn add_i64(&mut self, field: &str, old: i64, new: i64) {
        if old != new {
            self.add(field, &old.to_string(), &new.to_string());
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.changes)
    }

    pub fn to_description(&self) -> String {
        self.changes
            .iter()
            .map(|c| match (&c.old, &c.new) {
                (Some(old), Some(new)) => format!("{}: '{}' -> '{}'", c.field, old, new),
                (None, Some(new)) => format!("{}: '{}'", c.field, new),
                (Some(old), None) => format!("{}: removed '{}'", c.field, old),
                (None, None) => c.field.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_skips_identical_values() {
        let mut cs = ChangeSet::new();
        cs.add("label", "BOX-1", "BOX-1");
        assert!(!cs.has_changes());
        cs.add("label", "BOX-1", "BOX-2");
        assert!(cs.has_changes());
        assert_eq!(cs.to_description(), "label: 'BOX-1' -> 'BOX-2'");
    }

    #[test]
    fn test_changeset_description_forms() {
        let mut cs = ChangeSet::new();
        cs.created("capacity", "25");
        cs.deleted("status", "open");
        cs.add_i64("aisle", 1, 2);
        assert_eq!(
            cs.to_description(),
            "capacity: '25', status: removed 'open', aisle: '1' -> '2'"
        );
    }
}
