//! Organization resolver: answers "which tenant is this caller in" and "is
//! this caller a super-admin".
//!
//! Both questions go to the backend on every call. The resolver holds no
//! state; callers that need a stable tenant id cache it themselves (see
//! [`OrgApiClient`](crate::services::api_client::OrgApiClient)).

use std::sync::Arc;
use thiserror::Error;

use crate::models::{Identity, Membership, Organization, UserRole};
use crate::services::backend::{BackendError, OrganizationBackend};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Organization lookup failed: {0}")]
    Backend(#[from] BackendError),
}

pub struct OrganizationResolver {
    backend: Arc<dyn OrganizationBackend>,
}

impl OrganizationResolver {
    pub fn new(backend: Arc<dyn OrganizationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn OrganizationBackend> {
        &self.backend
    }

    /// The caller's organization and role. `Ok(None)` is a user who has not
    /// joined or created an organization yet, which is not an error.
    pub async fn current_membership(&self, identity: &Identity) -> Result<Option<Membership>, ResolveError> {
        let membership = self.backend.membership_for_user(identity).await.map_err(|e| {
            tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to resolve organization");
            e
        })?;

        tracing::debug!(
            user_id = %identity.user_id,
            organization_id = ?membership.as_ref().map(|m| m.organization.id),
            "Resolved organization membership"
        );

        Ok(membership)
    }

    pub async fn current_user_organization(
        &self,
        identity: &Identity,
    ) -> Result<Option<Organization>, ResolveError> {
        Ok(self
            .current_membership(identity)
            .await?
            .map(|membership| membership.organization))
    }

    /// Capability check independent of tenant context.
    pub async fn is_super_admin(&self, email: &str) -> Result<bool, ResolveError> {
        self.backend.is_super_admin(email).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to check super-admin role");
            ResolveError::from(e)
        })
    }

    pub async fn resolve_role(&self, email: &str) -> Result<UserRole, ResolveError> {
        Ok(if self.is_super_admin(email).await? {
            UserRole::SuperAdmin
        } else {
            UserRole::Regular
        })
    }
}
