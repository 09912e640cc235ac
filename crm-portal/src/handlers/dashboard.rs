use axum::{
    extract::{Path, State},
    Json,
};
use crm_core::error::AppError;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AuthUser, Identity, JoinRequest, MemberRole, Organization, OrganizationMember, UserProfile};
use crate::AppState;

#[derive(Serialize)]
pub struct Dashboard {
    pub user: UserProfile,
    /// `None` for a super-admin outside any organization.
    pub organization: Option<Organization>,
    pub member_role: Option<MemberRole>,
}

pub async fn dashboard_handler(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Dashboard>, AppError> {
    let membership = state.resolver.current_membership(&identity).await?;
    let role = state.resolver.resolve_role(&identity.email).await?;

    let (organization, member_role) = match membership {
        Some(m) => (Some(m.organization), Some(m.role)),
        None => (None, None),
    };

    Ok(Json(Dashboard {
        user: UserProfile {
            id: identity.user_id,
            email: identity.email,
            role,
        },
        organization,
        member_role,
    }))
}

async fn current_organization_id(state: &AppState, identity: &Identity) -> Result<Uuid, AppError> {
    state
        .resolver
        .current_user_organization(identity)
        .await?
        .map(|organization| organization.id)
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("No organization context")))
}

pub async fn list_members(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<OrganizationMember>>, AppError> {
    let organization_id = current_organization_id(&state, &identity).await?;
    let members = state
        .organizations
        .list_members(&identity, organization_id)
        .await?;
    Ok(Json(members))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<JoinRequest>>, AppError> {
    let organization_id = current_organization_id(&state, &identity).await?;
    let requests = state
        .join_requests
        .pending_for_organization(&identity, organization_id)
        .await?;
    Ok(Json(requests))
}

pub async fn approve_join_request(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<JoinRequest>, AppError> {
    let request = state.join_requests.approve(&identity, request_id).await?;
    // The requester's cached "no organization" is now wrong.
    state.api_clients.evict(request.user_id).await;
    Ok(Json(request))
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<JoinRequest>, AppError> {
    Ok(Json(state.join_requests.reject(&identity, request_id).await?))
}
