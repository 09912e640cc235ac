//! Join request workflow.
//!
//! A request is created `pending` by the user who wants in and resolved
//! exactly once by an admin of the target organization (or a super-admin).
//! The backend write is conditional on the stored row still being pending,
//! so two admins racing on the same request produce one resolution and one
//! [`JoinRequestError::AlreadyResolved`].

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AlreadyResolved, Identity, JoinRequest, JoinRequestFilter, JoinRequestStatus, MemberRole,
    OrganizationMember, SubmitJoinRequest,
};
use crate::services::backend::{BackendError, OrganizationBackend};
use crate::services::organizations::can_manage;
use crate::services::resolver::{OrganizationResolver, ResolveError};

#[derive(Debug, Error)]
pub enum JoinRequestError {
    #[error("User already belongs to an organization")]
    AlreadyMember,

    #[error("A pending request for this organization already exists")]
    DuplicateRequest,

    #[error("Organization {0} not found")]
    OrganizationNotFound(Uuid),

    #[error("Organization {0} is not accepting members")]
    OrganizationInactive(Uuid),

    #[error("Join request {0} not found")]
    NotFound(Uuid),

    #[error("Not allowed to manage join requests for organization {0}")]
    NotAuthorized(Uuid),

    #[error(transparent)]
    AlreadyResolved(#[from] AlreadyResolved),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct JoinRequestService {
    resolver: Arc<OrganizationResolver>,
}

impl JoinRequestService {
    pub fn new(resolver: Arc<OrganizationResolver>) -> Self {
        Self { resolver }
    }

    fn backend(&self) -> &Arc<dyn OrganizationBackend> {
        self.resolver.backend()
    }

    pub async fn submit(
        &self,
        identity: &Identity,
        payload: SubmitJoinRequest,
    ) -> Result<JoinRequest, JoinRequestError> {
        if self.resolver.current_membership(identity).await?.is_some() {
            return Err(JoinRequestError::AlreadyMember);
        }

        let organization = self
            .backend()
            .get_organization(identity, payload.organization_id)
            .await?
            .ok_or(JoinRequestError::OrganizationNotFound(payload.organization_id))?;

        if !organization.is_active {
            return Err(JoinRequestError::OrganizationInactive(organization.id));
        }

        let pending = self
            .backend()
            .list_join_requests(
                identity,
                &JoinRequestFilter {
                    organization_id: Some(organization.id),
                    user_id: Some(identity.user_id),
                    status: Some(JoinRequestStatus::Pending),
                },
            )
            .await?;
        if !pending.is_empty() {
            return Err(JoinRequestError::DuplicateRequest);
        }

        let request = JoinRequest::new(
            organization.id,
            identity.user_id,
            identity.email.clone(),
            payload.message,
        );
        let created = self.backend().create_join_request(identity, &request).await?;

        tracing::info!(
            join_request_id = %created.id,
            organization_id = %created.organization_id,
            user_id = %identity.user_id,
            "Join request submitted"
        );

        Ok(created)
    }

    /// The caller's own requests, newest first.
    pub async fn mine(&self, identity: &Identity) -> Result<Vec<JoinRequest>, JoinRequestError> {
        Ok(self
            .backend()
            .list_join_requests(
                identity,
                &JoinRequestFilter {
                    user_id: Some(identity.user_id),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn pending_for_organization(
        &self,
        actor: &Identity,
        organization_id: Uuid,
    ) -> Result<Vec<JoinRequest>, JoinRequestError> {
        if !can_manage(&self.resolver, actor, organization_id).await? {
            return Err(JoinRequestError::NotAuthorized(organization_id));
        }

        Ok(self
            .backend()
            .list_join_requests(
                actor,
                &JoinRequestFilter {
                    organization_id: Some(organization_id),
                    status: Some(JoinRequestStatus::Pending),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Approves a pending request and adds the requester as a member.
    pub async fn approve(&self, actor: &Identity, request_id: Uuid) -> Result<JoinRequest, JoinRequestError> {
        self.resolve(actor, request_id, JoinRequestStatus::Approved)
            .await
    }

    pub async fn reject(&self, actor: &Identity, request_id: Uuid) -> Result<JoinRequest, JoinRequestError> {
        self.resolve(actor, request_id, JoinRequestStatus::Rejected)
            .await
    }

    async fn resolve(
        &self,
        actor: &Identity,
        request_id: Uuid,
        decision: JoinRequestStatus,
    ) -> Result<JoinRequest, JoinRequestError> {
        let mut request = self
            .backend()
            .get_join_request(actor, request_id)
            .await?
            .ok_or(JoinRequestError::NotFound(request_id))?;

        if !can_manage(&self.resolver, actor, request.organization_id).await? {
            tracing::warn!(
                join_request_id = %request_id,
                actor = %actor.user_id,
                "Join request resolution denied"
            );
            return Err(JoinRequestError::NotAuthorized(request.organization_id));
        }

        match decision {
            JoinRequestStatus::Approved => request.approve(actor.user_id)?,
            _ => request.reject(actor.user_id)?,
        }

        let Some(stored) = self.backend().resolve_join_request(actor, &request).await? else {
            // Another actor resolved it between our read and write.
            let status = self
                .backend()
                .get_join_request(actor, request_id)
                .await?
                .map(|current| current.status)
                .unwrap_or(decision);
            return Err(AlreadyResolved {
                id: request_id,
                status,
            }
            .into());
        };

        if stored.status == JoinRequestStatus::Approved {
            self.backend()
                .add_member(
                    actor,
                    &OrganizationMember {
                        organization_id: stored.organization_id,
                        user_id: stored.user_id,
                        email: Some(stored.email.clone()),
                        role: MemberRole::Member,
                        created_at: None,
                    },
                )
                .await?;
        }

        tracing::info!(
            join_request_id = %stored.id,
            organization_id = %stored.organization_id,
            status = %stored.status,
            resolved_by = %actor.user_id,
            "Join request resolved"
        );

        Ok(stored)
    }
}
