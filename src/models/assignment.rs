// src/models/assignment.rs
//! Bulk assignment contract. Both bulk operations are best-effort
//! batches processed in list order: failures never roll back the
//! identifiers that already succeeded.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct BulkAssignRequest {
    pub box_id: String,

    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 identifiers per batch"))]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkUnassignRequest {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 identifiers per batch"))]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FailedIdentifier {
    pub identifier: String,
    pub reason: String,
}

/// Outcome of a bulk assign/unassign batch
#[derive(Debug, Serialize, Default)]
pub struct BulkResult {
    pub assigned: usize,
    pub box_full: bool,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedIdentifier>,
}

impl BulkResult {
    pub fn ok(&mut self, identifier: &str) {
        self.assigned += 1;
        self.succeeded.push(identifier.to_string());
    }

    pub fn fail(&mut self, identifier: &str, reason: &str) {
        self.failed.push(FailedIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        });
    }
}
