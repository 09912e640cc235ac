//! Join request model: a user's request to become a member of an organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Join request state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, JoinRequestStatus::Pending)
    }
}

impl fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted transition on a request that already left `pending`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("join request {id} is already {status}")]
pub struct AlreadyResolved {
    pub id: Uuid,
    pub status: JoinRequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<Uuid>,
}

impl JoinRequest {
    /// Create a new pending request.
    pub fn new(organization_id: Uuid, user_id: Uuid, email: String, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            email,
            message,
            status: JoinRequestStatus::Pending,
            created_at: Some(Utc::now()),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }

    pub fn approve(&mut self, resolved_by: Uuid) -> Result<(), AlreadyResolved> {
        self.resolve(JoinRequestStatus::Approved, resolved_by)
    }

    pub fn reject(&mut self, resolved_by: Uuid) -> Result<(), AlreadyResolved> {
        self.resolve(JoinRequestStatus::Rejected, resolved_by)
    }

    /// Moves a pending request to `to`. Resolved requests are immutable.
    fn resolve(&mut self, to: JoinRequestStatus, resolved_by: Uuid) -> Result<(), AlreadyResolved> {
        if self.status.is_resolved() {
            return Err(AlreadyResolved {
                id: self.id,
                status: self.status,
            });
        }
        self.status = to;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(resolved_by);
        Ok(())
    }
}

/// Payload for submitting a join request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitJoinRequest {
    pub organization_id: Uuid,
    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

/// Filter used when listing join requests.
#[derive(Debug, Clone, Default)]
pub struct JoinRequestFilter {
    pub organization_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<JoinRequestStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> JoinRequest {
        JoinRequest::new(Uuid::new_v4(), Uuid::new_v4(), "new@acme.io".to_string(), None)
    }

    #[test]
    fn starts_pending() {
        let request = pending();
        assert!(request.is_pending());
        assert!(request.resolved_at.is_none());
    }

    #[test]
    fn approve_is_terminal() {
        let admin = Uuid::new_v4();
        let mut request = pending();

        request.approve(admin).unwrap();
        assert_eq!(request.status, JoinRequestStatus::Approved);
        assert_eq!(request.resolved_by, Some(admin));

        let err = request.reject(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status, JoinRequestStatus::Approved);
        assert_eq!(request.status, JoinRequestStatus::Approved);
        assert_eq!(request.resolved_by, Some(admin));

        assert!(request.approve(admin).is_err());
    }

    #[test]
    fn reject_is_terminal() {
        let mut request = pending();
        request.reject(Uuid::new_v4()).unwrap();

        assert!(request.approve(Uuid::new_v4()).is_err());
        assert_eq!(request.status, JoinRequestStatus::Rejected);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(JoinRequestStatus::Pending).unwrap(),
            serde_json::json!("pending")
        );
    }
}
