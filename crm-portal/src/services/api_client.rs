//! Organization-scoped client for the CRM API.
//!
//! Every call resolves the caller's organization first and attaches it as
//! `X-Organization-ID`. Without an organization the call fails with
//! [`ApiError::NoOrganizationContext`] before anything is sent, unless the
//! caller opts out with [`RequestOptions::without_organization`].
//!
//! The resolved id is cached for the lifetime of the client. Resolution runs
//! under an async mutex, so concurrent first calls trigger a single backend
//! lookup. [`OrgApiClient::reset_organization`] drops the cached id.

use crm_core::observability::TracedClientExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::Identity;
use crate::services::metrics;
use crate::services::resolver::OrganizationResolver;

/// Header carrying the tenant id on every organization-scoped call.
pub const ORGANIZATION_HEADER: &str = "X-Organization-ID";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("No organization context")]
    NoOrganizationContext,

    #[error("Organization resolution failed: {0}")]
    Resolution(String),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ApiError {
    fn outcome(&self) -> &'static str {
        match self {
            ApiError::NoOrganizationContext => "no_context",
            ApiError::Resolution(_) => "resolution_error",
            ApiError::Status { .. } => "http_error",
            ApiError::Transport(_) => "transport_error",
            ApiError::Decode(_) => "decode_error",
            ApiError::InvalidUpload(_) => "invalid_upload",
            ApiError::InvalidEndpoint(_) => "invalid_endpoint",
        }
    }
}

/// Serialisable `{success, data?, error?}` envelope of an API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl<T> From<Result<T, ApiError>> for ApiResponse<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
                status: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                status: match &err {
                    ApiError::Status { status, .. } => Some(*status),
                    _ => None,
                },
                error: Some(err.to_string()),
            },
        }
    }
}

/// Per-call options for [`OrgApiClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Send without resolving or attaching the organization id.
    pub skip_organization: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn with_method(method: Method, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn without_organization(mut self) -> Self {
        self.skip_organization = true;
        self
    }
}

/// A file to send as the `file` part of a multipart upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

enum RequestBody {
    Json(Option<Value>),
    Multipart(Form),
}

pub struct OrgApiClient {
    http: Client,
    base_url: String,
    resolver: Arc<OrganizationResolver>,
    identity: Identity,
    organization_id: Mutex<Option<Uuid>>,
}

impl OrgApiClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        resolver: Arc<OrganizationResolver>,
        identity: Identity,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            resolver,
            identity,
            organization_id: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The caller's organization id, resolved on first use and cached until
    /// [`reset_organization`](Self::reset_organization). `Ok(None)` is not
    /// cached, so a user who joins later is picked up on the next call.
    pub async fn current_organization_id(&self) -> Result<Option<Uuid>, ApiError> {
        let mut cached = self.organization_id.lock().await;
        if let Some(id) = *cached {
            return Ok(Some(id));
        }

        let resolved = self
            .resolver
            .current_user_organization(&self.identity)
            .await
            .map_err(|e| ApiError::Resolution(e.to_string()))?
            .map(|organization| organization.id);

        if resolved.is_some() {
            *cached = resolved;
        }
        Ok(resolved)
    }

    pub async fn reset_organization(&self) {
        *self.organization_id.lock().await = None;
    }

    /// Joins `endpoint` onto `<base>/api/`. The normalised URL must stay
    /// under that prefix, so dot segments (raw or percent-encoded) cannot
    /// reach other paths on the API host.
    fn url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let api_root = format!("{}/api/", self.base_url.trim_end_matches('/'));
        let root = Url::parse(&api_root).map_err(|e| ApiError::InvalidEndpoint(e.to_string()))?;
        let url = Url::parse(&format!("{}{}", api_root, endpoint.trim_start_matches('/')))
            .map_err(|e| ApiError::InvalidEndpoint(e.to_string()))?;

        let same_origin = url.origin() == root.origin();
        if !same_origin || !url.path().starts_with(root.path()) {
            return Err(ApiError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(url)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let RequestOptions {
            method,
            body,
            headers,
            skip_organization,
        } = options;

        self.send(endpoint, method, headers, skip_organization, RequestBody::Json(body))
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::with_method(Method::POST, Some(body)))
            .await
    }

    pub async fn put<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::with_method(Method::PUT, Some(body)))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::with_method(Method::PATCH, Some(body)))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::with_method(Method::DELETE, None))
            .await
    }

    /// POSTs a multipart form with the file under `file` and each entry of
    /// `fields` as a text part. Strings are sent as-is, other values as JSON.
    pub async fn upload_file<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        file: FileUpload,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<T, ApiError> {
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;
        }

        let mut form = Form::new().part("file", part);
        for (name, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(name.clone(), text);
        }

        self.send(endpoint, Method::POST, Vec::new(), false, RequestBody::Multipart(form))
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        headers: Vec<(String, String)>,
        skip_organization: bool,
        body: RequestBody,
    ) -> Result<T, ApiError> {
        let result = self
            .send_inner(endpoint, method.clone(), headers, skip_organization, body)
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_api_request(method.as_str(), outcome);

        if let Err(e) = &result {
            tracing::warn!(endpoint = %endpoint, method = %method, error = %e, "CRM API call failed");
        }
        result
    }

    async fn send_inner<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        headers: Vec<(String, String)>,
        skip_organization: bool,
        body: RequestBody,
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint)?;

        let organization_id = if skip_organization {
            None
        } else {
            Some(
                self.current_organization_id()
                    .await?
                    .ok_or(ApiError::NoOrganizationContext)?,
            )
        };

        let mut request = self
            .http
            .traced_request(method, url.as_str())
            .bearer_auth(&self.identity.access_token);

        if let Some(id) = organization_id {
            request = request.header(ORGANIZATION_HEADER, id.to_string());
        }

        request = match body {
            RequestBody::Json(Some(json)) => request.json(&json),
            RequestBody::Json(None) => request.header(CONTENT_TYPE, "application/json"),
            RequestBody::Multipart(form) => request.multipart(form),
        };

        for (name, value) in &headers {
            // The tenant header only ever carries the resolved organization.
            if name.eq_ignore_ascii_case(ORGANIZATION_HEADER) {
                tracing::warn!(endpoint = %endpoint, "Ignoring caller-supplied organization header");
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(raw).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_from_success() {
        let response: ApiResponse<u32> = Ok(7).into();
        assert!(response.success);
        assert_eq!(response.data, Some(7));
        assert!(response.error.is_none());
    }

    #[test]
    fn envelope_from_status_error_keeps_status() {
        let response: ApiResponse<u32> = Err(ApiError::Status {
            status: 409,
            body: "duplicate".to_string(),
        })
        .into();

        assert!(!response.success);
        assert_eq!(response.status, Some(409));
        assert_eq!(
            response.error.as_deref(),
            Some("Request failed with status 409: duplicate")
        );
    }

    #[test]
    fn envelope_serializes_without_empty_fields() {
        let response: ApiResponse<Value> = Err(ApiError::NoOrganizationContext).into();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "success": false, "error": "No organization context" })
        );
    }

    #[test]
    fn options_builders() {
        let options = RequestOptions::with_method(Method::PATCH, Some(serde_json::json!({"a": 1})))
            .with_header("x-trace", "1")
            .without_organization();

        assert_eq!(options.method, Method::PATCH);
        assert!(options.skip_organization);
        assert_eq!(options.headers, vec![("x-trace".to_string(), "1".to_string())]);
    }
}
