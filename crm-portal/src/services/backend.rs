//! Backend-service client: organizations, memberships, join requests and
//! role lookups.
//!
//! The backend exposes PostgREST-style tables under `/rest/v1`. Row-level
//! security is enforced there, so every call carries the caller's access token;
//! the portal never filters rows it was not allowed to read.

use async_trait::async_trait;
use chrono::Utc;
use crm_core::observability::{TracedClientExt, TracedRequest};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::BackendSettings;
use crate::models::{
    Identity, JoinRequest, JoinRequestFilter, MemberRole, Membership, NewOrganization,
    Organization, OrganizationMember,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

/// Collaborator surface of the backend service consumed by the portal.
#[async_trait]
pub trait OrganizationBackend: Send + Sync {
    /// The caller's organization and role, or `None` for a user without one.
    async fn membership_for_user(&self, identity: &Identity) -> Result<Option<Membership>, BackendError>;

    async fn is_super_admin(&self, email: &str) -> Result<bool, BackendError>;

    /// Active organizations, ordered by name.
    async fn list_organizations(&self, identity: &Identity) -> Result<Vec<Organization>, BackendError>;

    /// Every organization, inactive ones included, ordered by name.
    async fn list_all_organizations(&self, identity: &Identity) -> Result<Vec<Organization>, BackendError>;

    async fn get_organization(
        &self,
        identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, BackendError>;

    async fn create_organization(
        &self,
        identity: &Identity,
        organization: &NewOrganization,
    ) -> Result<Organization, BackendError>;

    async fn add_member(
        &self,
        identity: &Identity,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, BackendError>;

    async fn list_members(
        &self,
        identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, BackendError>;

    async fn create_join_request(
        &self,
        identity: &Identity,
        request: &JoinRequest,
    ) -> Result<JoinRequest, BackendError>;

    async fn get_join_request(
        &self,
        identity: &Identity,
        request_id: Uuid,
    ) -> Result<Option<JoinRequest>, BackendError>;

    async fn list_join_requests(
        &self,
        identity: &Identity,
        filter: &JoinRequestFilter,
    ) -> Result<Vec<JoinRequest>, BackendError>;

    /// Persists a resolved request only if the stored row is still pending.
    /// Returns `None` when another actor resolved it first.
    async fn resolve_join_request(
        &self,
        identity: &Identity,
        resolved: &JoinRequest,
    ) -> Result<Option<JoinRequest>, BackendError>;
}

/// REST implementation of [`OrganizationBackend`].
pub struct RestBackend {
    client: Client,
    settings: BackendSettings,
}

#[derive(Deserialize)]
struct MembershipRow {
    role: MemberRole,
    organization: Option<Organization>,
}

fn eq<T: std::fmt::Display>(value: T) -> String {
    format!("eq.{}", value)
}

impl RestBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn with_client(client: Client, settings: BackendSettings) -> Self {
        Self { client, settings }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.settings.url.trim_end_matches('/'), table)
    }

    fn authorize(&self, request: TracedRequest, bearer: &str) -> TracedRequest {
        request
            .header("apikey", self.settings.anon_key.expose_secret().as_str())
            .bearer_auth(bearer)
    }

    async fn read<T: DeserializeOwned>(table: &str, response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(table = %table, status = %status, "Backend call failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| BackendError::Malformed(format!("{} response: {}", table, e)))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        bearer: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.table_url(table);
        let response = self
            .authorize(self.client.traced_get(&url), bearer)
            .query(query)
            .send()
            .await?;

        Self::read(table, response).await
    }

    async fn insert<B: serde::Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        bearer: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.table_url(table);
        let response = self
            .authorize(self.client.traced_post(&url), bearer)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        let mut rows: Vec<T> = Self::read(table, response).await?;
        if rows.is_empty() {
            return Err(BackendError::Malformed(format!("{} insert returned no rows", table)));
        }
        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl OrganizationBackend for RestBackend {
    async fn membership_for_user(&self, identity: &Identity) -> Result<Option<Membership>, BackendError> {
        let rows: Vec<MembershipRow> = self
            .select(
                "organization_members",
                &identity.access_token,
                &[
                    ("user_id", eq(identity.user_id)),
                    ("select", "role,organization:organizations(*)".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        match rows.into_iter().next() {
            None => Ok(None),
            Some(MembershipRow {
                role,
                organization: Some(organization),
            }) => Ok(Some(Membership { organization, role })),
            Some(MembershipRow { organization: None, .. }) => Err(BackendError::Malformed(
                "membership row without organization".to_string(),
            )),
        }
    }

    async fn is_super_admin(&self, email: &str) -> Result<bool, BackendError> {
        let anon = self.settings.anon_key.expose_secret().clone();
        let rows: Vec<serde_json::Value> = self
            .select(
                "user_roles",
                &anon,
                &[
                    ("email", eq(email)),
                    ("role", eq("super_admin")),
                    ("select", "role".to_string()),
                ],
            )
            .await?;

        Ok(!rows.is_empty())
    }

    async fn list_organizations(&self, identity: &Identity) -> Result<Vec<Organization>, BackendError> {
        self.select(
            "organizations",
            &identity.access_token,
            &[
                ("is_active", eq(true)),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
    }

    async fn list_all_organizations(&self, identity: &Identity) -> Result<Vec<Organization>, BackendError> {
        self.select(
            "organizations",
            &identity.access_token,
            &[("order", "name.asc".to_string())],
        )
        .await
    }

    async fn get_organization(
        &self,
        identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Option<Organization>, BackendError> {
        let rows: Vec<Organization> = self
            .select(
                "organizations",
                &identity.access_token,
                &[("id", eq(organization_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_organization(
        &self,
        identity: &Identity,
        organization: &NewOrganization,
    ) -> Result<Organization, BackendError> {
        self.insert("organizations", &identity.access_token, organization)
            .await
    }

    async fn add_member(
        &self,
        identity: &Identity,
        member: &OrganizationMember,
    ) -> Result<OrganizationMember, BackendError> {
        self.insert("organization_members", &identity.access_token, member)
            .await
    }

    async fn list_members(
        &self,
        identity: &Identity,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, BackendError> {
        self.select(
            "organization_members",
            &identity.access_token,
            &[
                ("organization_id", eq(organization_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn create_join_request(
        &self,
        identity: &Identity,
        request: &JoinRequest,
    ) -> Result<JoinRequest, BackendError> {
        self.insert("join_requests", &identity.access_token, request)
            .await
    }

    async fn get_join_request(
        &self,
        identity: &Identity,
        request_id: Uuid,
    ) -> Result<Option<JoinRequest>, BackendError> {
        let rows: Vec<JoinRequest> = self
            .select(
                "join_requests",
                &identity.access_token,
                &[("id", eq(request_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_join_requests(
        &self,
        identity: &Identity,
        filter: &JoinRequestFilter,
    ) -> Result<Vec<JoinRequest>, BackendError> {
        let mut query = vec![("order", "created_at.desc".to_string())];
        if let Some(organization_id) = filter.organization_id {
            query.push(("organization_id", eq(organization_id)));
        }
        if let Some(user_id) = filter.user_id {
            query.push(("user_id", eq(user_id)));
        }
        if let Some(status) = filter.status {
            query.push(("status", eq(status)));
        }

        self.select("join_requests", &identity.access_token, &query)
            .await
    }

    async fn resolve_join_request(
        &self,
        identity: &Identity,
        resolved: &JoinRequest,
    ) -> Result<Option<JoinRequest>, BackendError> {
        let url = self.table_url("join_requests");
        let response = self
            .authorize(self.client.traced_patch(&url), &identity.access_token)
            .header("Prefer", "return=representation")
            .query(&[("id", eq(resolved.id)), ("status", eq("pending"))])
            .json(&serde_json::json!({
                "status": resolved.status,
                "resolved_by": resolved.resolved_by,
                "resolved_at": resolved.resolved_at.unwrap_or_else(Utc::now),
            }))
            .send()
            .await?;

        let rows: Vec<JoinRequest> = Self::read("join_requests", response).await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JoinRequestStatus;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> RestBackend {
        RestBackend::new(BackendSettings {
            url: server.uri(),
            anon_key: Secret::new("anon".to_string()),
        })
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::parse_str("0b7e7f4c-3f7a-4f62-9a57-7d4b8f6f1a01").unwrap(),
            email: "jane@acme.io".to_string(),
            access_token: "user-token".to_string(),
        }
    }

    #[tokio::test]
    async fn membership_lookup_sends_user_token_and_filter() {
        let server = MockServer::start().await;
        let org_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/organization_members"))
            .and(query_param("user_id", format!("eq.{}", identity().user_id)))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "role": "admin", "organization": { "id": org_id, "name": "Acme" } }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let membership = backend(&server)
            .membership_for_user(&identity())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(membership.organization.id, org_id);
        assert_eq!(membership.role, MemberRole::Admin);
    }

    #[tokio::test]
    async fn membership_without_organization_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/organization_members"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "role": "member", "organization": null }])),
            )
            .mount(&server)
            .await;

        let err = backend(&server)
            .membership_for_user(&identity())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn no_rows_means_no_membership() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/organization_members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let membership = backend(&server).membership_for_user(&identity()).await.unwrap();
        assert!(membership.is_none());
    }

    #[tokio::test]
    async fn super_admin_check_uses_role_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/user_roles"))
            .and(query_param("email", "eq.root@acme.io"))
            .and(query_param("role", "eq.super_admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "role": "super_admin" }])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/user_roles"))
            .and(query_param("email", "eq.jane@acme.io"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let backend = backend(&server);
        assert!(backend.is_super_admin("root@acme.io").await.unwrap());
        assert!(!backend.is_super_admin("jane@acme.io").await.unwrap());
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/organizations"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .list_organizations(&identity())
            .await
            .unwrap_err();

        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "JWT expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn organization_listings_differ_only_in_active_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/organizations"))
            .and(query_param("order", "name.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let backend = backend(&server);
        backend.list_organizations(&identity()).await.unwrap();
        backend.list_all_organizations(&identity()).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let filters: Vec<bool> = received
            .iter()
            .map(|r| r.url.query_pairs().any(|(k, _)| k == "is_active"))
            .collect();
        assert_eq!(filters, vec![true, false]);
    }

    #[tokio::test]
    async fn resolve_is_conditional_on_pending() {
        let server = MockServer::start().await;
        let mut request = JoinRequest::new(Uuid::new_v4(), Uuid::new_v4(), "n@acme.io".into(), None);
        request.approve(identity().user_id).unwrap();

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/join_requests"))
            .and(query_param("id", format!("eq.{}", request.id)))
            .and(query_param("status", "eq.pending"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let stored = backend(&server)
            .resolve_join_request(&identity(), &request)
            .await
            .unwrap();
        assert!(stored.is_none());
        assert_eq!(request.status, JoinRequestStatus::Approved);
    }
}
