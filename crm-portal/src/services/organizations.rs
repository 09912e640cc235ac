use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Identity, MemberRole, NewOrganization, Organization, OrganizationMember};
use crate::services::backend::{BackendError, OrganizationBackend};
use crate::services::resolver::{OrganizationResolver, ResolveError};

#[derive(Debug, Error)]
pub enum OrganizationError {
    #[error("User already belongs to an organization")]
    AlreadyMember,

    #[error("Not allowed to access organization {0}")]
    NotAuthorized(Uuid),

    #[error("Super-admin access required")]
    SuperAdminRequired,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Whether `actor` administers `organization_id`. Super-admins administer all
/// organizations.
pub(crate) async fn can_manage(
    resolver: &OrganizationResolver,
    actor: &Identity,
    organization_id: Uuid,
) -> Result<bool, ResolveError> {
    if let Some(membership) = resolver.current_membership(actor).await? {
        if membership.organization.id == organization_id && membership.role.can_manage_members() {
            return Ok(true);
        }
    }
    resolver.is_super_admin(&actor.email).await
}

/// Whether `actor` may read `organization_id` (member of it, or super-admin).
pub(crate) async fn can_view(
    resolver: &OrganizationResolver,
    actor: &Identity,
    organization_id: Uuid,
) -> Result<bool, ResolveError> {
    if let Some(organization) = resolver.current_user_organization(actor).await? {
        if organization.id == organization_id {
            return Ok(true);
        }
    }
    resolver.is_super_admin(&actor.email).await
}

pub struct OrganizationService {
    resolver: Arc<OrganizationResolver>,
}

impl OrganizationService {
    pub fn new(resolver: Arc<OrganizationResolver>) -> Self {
        Self { resolver }
    }

    fn backend(&self) -> &Arc<dyn OrganizationBackend> {
        self.resolver.backend()
    }

    /// Creates an organization with the caller as its admin.
    pub async fn create_organization(
        &self,
        identity: &Identity,
        new_organization: &NewOrganization,
    ) -> Result<Organization, OrganizationError> {
        if self.resolver.current_membership(identity).await?.is_some() {
            return Err(OrganizationError::AlreadyMember);
        }

        let organization = self
            .backend()
            .create_organization(identity, new_organization)
            .await?;

        self.backend()
            .add_member(
                identity,
                &OrganizationMember {
                    organization_id: organization.id,
                    user_id: identity.user_id,
                    email: Some(identity.email.clone()),
                    role: MemberRole::Admin,
                    created_at: None,
                },
            )
            .await?;

        tracing::info!(
            organization_id = %organization.id,
            user_id = %identity.user_id,
            "Organization created"
        );

        Ok(organization)
    }

    pub async fn list_organizations(&self, identity: &Identity) -> Result<Vec<Organization>, OrganizationError> {
        Ok(self.backend().list_organizations(identity).await?)
    }

    /// Every organization, inactive ones included. Super-admins only.
    pub async fn list_all_organizations(&self, actor: &Identity) -> Result<Vec<Organization>, OrganizationError> {
        if !self.resolver.is_super_admin(&actor.email).await? {
            return Err(OrganizationError::SuperAdminRequired);
        }
        Ok(self.backend().list_all_organizations(actor).await?)
    }

    pub async fn list_members(
        &self,
        actor: &Identity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, OrganizationError> {
        if !can_view(&self.resolver, actor, organization_id).await? {
            return Err(OrganizationError::NotAuthorized(organization_id));
        }
        Ok(self.backend().list_members(actor, organization_id).await?)
    }
}
