// src/models/file_request.rs
//! File requests: a ward or doctor asks for a physical box. The status
//! machine is enforced in one place (`RequestStatus::can_transition_to`);
//! the requester's own cancel bypasses it from any active state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    InTransit,
    Delivered,
    ReturnRequested,
    Returned,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_valid(s: &str) -> bool {
        s.parse::<RequestStatus>().is_ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Returned | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, InTransit)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, InTransit)
                | (Approved, Cancelled)
                | (InTransit, Delivered)
                | (Delivered, ReturnRequested)
                | (ReturnRequested, Returned)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct FileRequest {
    pub id: String,
    pub box_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub status: String,
    pub notes: Option<String>,
    pub request_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request joined with box/rack labels for listings
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FileRequestWithBox {
    pub id: String,
    pub box_id: String,
    pub box_label: String,
    pub rack_label: String,
    pub requester_id: String,
    pub requester_name: String,
    pub status: String,
    pub notes: Option<String>,
    pub request_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFileRequestRequest {
    pub box_id: String,

    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequestStatusRequest {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestStatus::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(ReturnRequested));
        assert!(ReturnRequested.can_transition_to(Returned));
    }

    #[test]
    fn test_pending_shortcuts() {
        // Dispatch without an explicit approval step is allowed
        assert!(Pending.can_transition_to(InTransit));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!InTransit.can_transition_to(Returned));
        assert!(!Delivered.can_transition_to(Pending));
        // No automatic retry of a rejected request
        assert!(!Rejected.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [Returned, Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for target in [
                Pending,
                Approved,
                InTransit,
                Delivered,
                ReturnRequested,
                Returned,
                Rejected,
                Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(InTransit.to_string(), "in_transit");
        assert_eq!(
            "return_requested".parse::<RequestStatus>().unwrap(),
            ReturnRequested
        );
        assert!(!RequestStatus::is_valid("lost"));
    }
}
