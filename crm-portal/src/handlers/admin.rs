//! Platform administration, behind the super-admin guard.

use axum::{extract::State, Json};
use crm_core::error::AppError;
use serde::Serialize;

use crate::models::{AuthUser, JoinRequest, JoinRequestFilter, JoinRequestStatus, Organization};
use crate::AppState;

#[derive(Serialize)]
pub struct AdminOverview {
    pub organizations: Vec<Organization>,
    pub pending_requests: Vec<JoinRequest>,
}

pub async fn admin_dashboard_handler(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<AdminOverview>, AppError> {
    let organizations = state.organizations.list_all_organizations(&identity).await?;
    let pending_requests = state
        .resolver
        .backend()
        .list_join_requests(
            &identity,
            &JoinRequestFilter {
                status: Some(JoinRequestStatus::Pending),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(AdminOverview {
        organizations,
        pending_requests,
    }))
}
