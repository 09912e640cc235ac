//! Test helpers for crm-portal integration tests.
//!
//! Provides an in-memory organization backend and identity fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use crm_portal::guards::Navigator;
use crm_portal::models::{
    Identity, JoinRequest, JoinRequestFilter, MemberRole, Membership, NewOrganization,
    Organization, OrganizationMember, SubscriptionPlan,
};
use crm_portal::services::{BackendError, OrganizationBackend, OrganizationResolver};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

pub fn identity(email: &str) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        email: email.to_string(),
        access_token: format!("token-{}", email),
    }
}

pub fn organization(name: &str) -> Organization {
    Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        industry: None,
        website: None,
        subscription_plan: SubscriptionPlan::Free,
        is_active: true,
        created_at: Some(Utc::now()),
    }
}

/// In-memory stand-in for the backend service.
#[derive(Default)]
pub struct InMemoryBackend {
    organizations: Mutex<HashMap<Uuid, Organization>>,
    members: Mutex<Vec<OrganizationMember>>,
    super_admins: Mutex<HashSet<String>>,
    join_requests: Mutex<HashMap<Uuid, JoinRequest>>,
    membership_lookups: AtomicUsize,
    fail_lookups: AtomicBool,
    lookup_gate: Mutex<Option<Arc<Notify>>>,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resolver(self: &Arc<Self>) -> Arc<OrganizationResolver> {
        Arc::new(OrganizationResolver::new(self.clone()))
    }

    pub fn add_organization(&self, organization: Organization) -> Organization {
        self.organizations
            .lock()
            .unwrap()
            .insert(organization.id, organization.clone());
        organization
    }

    pub fn add_membership(&self, identity: &Identity, organization_id: Uuid, role: MemberRole) {
        self.members.lock().unwrap().push(OrganizationMember {
            organization_id,
            user_id: identity.user_id,
            email: Some(identity.email.clone()),
            role,
            created_at: Some(Utc::now()),
        });
    }

    pub fn grant_super_admin(&self, email: &str) {
        self.super_admins.lock().unwrap().insert(email.to_string());
    }

    /// Makes every membership and role lookup fail with a 500.
    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    /// Blocks membership lookups until the returned handle is notified.
    pub fn gate_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.lookup_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn membership_lookups(&self) -> usize {
        self.membership_lookups.load(Ordering::SeqCst)
    }

    pub fn stored_request(&self, id: Uuid) -> Option<JoinRequest> {
        self.join_requests.lock().unwrap().get(&id).cloned()
    }

    fn check_failure(&self) -> Result<(), BackendError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 500,
                body: "lookup failed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationBackend for InMemoryBackend {
    async fn membership_for_user(&self, identity: &Identity) -> Result<Option<Membership>, BackendError> {
        self.membership_lookups.fetch_add(1, Ordering::SeqCst);

        let gate = self.lookup_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_failure()?;

        let member = self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.user_id == identity.user_id)
            .cloned();

        Ok(member.and_then(|m| {
            self.organizations
                .lock()
                .unwrap()
                .get(&m.organization_id)
                .cloned()
                .map(|organization| Membership {
                    organization,
                    role: m.role,
                })
        }))
    }

    async fn is_super_admin(&self, email: &str) -> Result<bool, BackendError> {
        self.check_failure()?;
        Ok(self.super_admins.lock().unwrap().contains(email))
    }

    async fn list_organizations(&self, _identity: &Identity) -> Result<Vec<Organization>, BackendError> {
        let mut organizations: Vec<Organization> = self
            .organizations
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.is_active)
            .cloned()
            .collect();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organizations)
    }

    async fn list_all_organizations(&self, _identity: &Identity) -> Result<Vec<Organization>, BackendError> {
        self.check_failure()?;
        let mut organizations: Vec<Organization> =
            self.organizations.lock().unwrap().values().cloned().collect();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organizations)
    }

    async fn get_organization(
        &self,
        _identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, BackendError> {
        Ok(self
            .organizations
            .lock()
            .unwrap()
            .get(&organization_id)
            .cloned())
    }

    async fn create_organization(
        &self,
        _identity: &Identity,
        new_organization: &NewOrganization,
    ) -> Result<Organization, BackendError> {
        let mut created = organization(&new_organization.name);
        created.industry = new_organization.industry.clone();
        created.website = new_organization.website.clone();
        created.subscription_plan = new_organization.subscription_plan;
        Ok(self.add_organization(created))
    }

    async fn add_member(
        &self,
        _identity: &Identity,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, BackendError> {
        self.members.lock().unwrap().push(member.clone());
        Ok(member.clone())
    }

    async fn list_members(
        &self,
        _identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, BackendError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn create_join_request(
        &self,
        _identity: &Identity,
        request: &JoinRequest,
    ) -> Result<JoinRequest, BackendError> {
        self.join_requests
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn get_join_request(
        &self,
        _identity: &Identity,
        request_id: Uuid,
    ) -> Result<Option<JoinRequest>, BackendError> {
        Ok(self.stored_request(request_id))
    }

    async fn list_join_requests(
        &self,
        _identity: &Identity,
        filter: &JoinRequestFilter,
    ) -> Result<Vec<JoinRequest>, BackendError> {
        Ok(self
            .join_requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| filter.organization_id.map_or(true, |id| r.organization_id == id))
            .filter(|r| filter.user_id.map_or(true, |id| r.user_id == id))
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .cloned()
            .collect())
    }

    async fn resolve_join_request(
        &self,
        _identity: &Identity,
        resolved: &JoinRequest,
    ) -> Result<Option<JoinRequest>, BackendError> {
        let mut requests = self.join_requests.lock().unwrap();
        match requests.get_mut(&resolved.id) {
            Some(stored) if stored.is_pending() => {
                *stored = resolved.clone();
                Ok(Some(resolved.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// Navigator that records every redirect it is asked to perform.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<&'static str>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<&'static str> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, route: &'static str) {
        self.routes.lock().unwrap().push(route);
    }
}
