//! Typed helpers over [`OrgApiClient`] for the CRM collections.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::services::api_client::{ApiError, FileUpload, OrgApiClient, RequestOptions};

/// A tenant-scoped collection served by the CRM API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrmResource {
    Customers,
    Campaigns,
    Templates,
    Journeys,
}

impl CrmResource {
    pub const ALL: [CrmResource; 4] = [
        CrmResource::Customers,
        CrmResource::Campaigns,
        CrmResource::Templates,
        CrmResource::Journeys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrmResource::Customers => "customers",
            CrmResource::Campaigns => "campaigns",
            CrmResource::Templates => "templates",
            CrmResource::Journeys => "journeys",
        }
    }
}

impl fmt::Display for CrmResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrmResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrmResource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown CRM resource '{}'", s))
    }
}

/// `<resource>/<id>`, where `id` must be a single unreserved path segment.
fn item_endpoint(resource: CrmResource, id: &str) -> Result<String, ApiError> {
    let is_segment = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | ':' | '@'));
    if !is_segment {
        return Err(ApiError::InvalidEndpoint(format!("invalid {} id '{}'", resource, id)));
    }
    Ok(format!("{}/{}", resource, id))
}

impl OrgApiClient {
    /// Lists a collection. `query` is forwarded verbatim as the query string.
    pub async fn list_resource(&self, resource: CrmResource, query: Option<&str>) -> Result<Value, ApiError> {
        let endpoint = match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}?{}", resource, q),
            None => resource.to_string(),
        };
        self.get(&endpoint).await
    }

    pub async fn get_resource(&self, resource: CrmResource, id: &str) -> Result<Value, ApiError> {
        self.get(&item_endpoint(resource, id)?).await
    }

    pub async fn create_resource(&self, resource: CrmResource, body: Value) -> Result<Value, ApiError> {
        self.post(resource.as_str(), body).await
    }

    pub async fn update_resource(
        &self,
        resource: CrmResource,
        id: &str,
        method: Method,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.request(
            &item_endpoint(resource, id)?,
            RequestOptions::with_method(method, Some(body)),
        )
        .await
    }

    pub async fn delete_resource(&self, resource: CrmResource, id: &str) -> Result<Value, ApiError> {
        self.delete(&item_endpoint(resource, id)?).await
    }

    /// Bulk import into a collection (e.g. a customer CSV).
    pub async fn import_resource(
        &self,
        resource: CrmResource,
        file: FileUpload,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<Value, ApiError> {
        self.upload_file(&format!("{}/import", resource), file, fields)
            .await
    }
}
