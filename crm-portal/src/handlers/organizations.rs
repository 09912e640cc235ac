//! Onboarding for signed-in users without an organization: browse, request
//! to join, or create one.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use crm_core::error::AppError;
use serde::Serialize;
use validator::Validate;

use crate::models::{AuthUser, JoinRequest, Membership, NewOrganization, Organization, SubmitJoinRequest};
use crate::AppState;

#[derive(Serialize)]
pub struct JoinPage {
    pub membership: Option<Membership>,
    pub organizations: Vec<Organization>,
    pub requests: Vec<JoinRequest>,
}

pub async fn join_page(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<JoinPage>, AppError> {
    let membership = state.resolver.current_membership(&identity).await?;
    let organizations = state.organizations.list_organizations(&identity).await?;
    let requests = state.join_requests.mine(&identity).await?;

    Ok(Json(JoinPage {
        membership,
        organizations,
        requests,
    }))
}

pub async fn submit_join_request(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<SubmitJoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let request = state.join_requests.submit(&identity, payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn create_organization(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<NewOrganization>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let organization = state
        .organizations
        .create_organization(&identity, &payload)
        .await?;

    // The cached "no organization" answer is stale now.
    state.api_clients.evict(identity.user_id).await;

    Ok((StatusCode::CREATED, Json(organization)))
}
