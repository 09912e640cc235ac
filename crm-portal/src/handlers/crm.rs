//! Pass-through to the CRM API, scoped to the caller's organization.
//!
//! Results are returned as the `{success, data?, error?}` envelope with the
//! HTTP status of the failure, if any.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, RawQuery, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use crm_core::error::AppError;
use serde_json::{Map, Value};

use crate::models::AuthUser;
use crate::services::crm::CrmResource;
use crate::services::{ApiError, ApiResponse, FileUpload};
use crate::AppState;

fn parse_resource(resource: &str) -> Result<CrmResource, AppError> {
    resource
        .parse()
        .map_err(|_| AppError::NotFound(anyhow::anyhow!("Unknown resource: {}", resource)))
}

fn respond(result: Result<Value, ApiError>, success: StatusCode) -> Response {
    let status = match &result {
        Ok(_) => success,
        Err(e) => AppError::from(e.clone()).status_code(),
    };
    (status, Json(ApiResponse::from(result))).into_response()
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(resource): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    let client = state.api_clients.client_for(&identity);
    Ok(respond(
        client.list_resource(resource, query.as_deref()).await,
        StatusCode::OK,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    let client = state.api_clients.client_for(&identity);
    Ok(respond(
        client.create_resource(resource, body).await,
        StatusCode::CREATED,
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    let client = state.api_clients.client_for(&identity);
    Ok(respond(client.get_resource(resource, &id).await, StatusCode::OK))
}

/// Handles both PUT and PATCH; the method is forwarded as received.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    method: Method,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    let client = state.api_clients.client_for(&identity);
    Ok(respond(
        client.update_resource(resource, &id, method, body).await,
        StatusCode::OK,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    let client = state.api_clients.client_for(&identity);
    Ok(respond(client.delete_resource(resource, &id).await, StatusCode::OK))
}

/// Segment that turns a POST on an item path into a bulk import.
pub const IMPORT_SEGMENT: &str = "import";

/// Multipart import on `POST <resource>/import`: the `file` field is the
/// upload, every other field is forwarded as a text field.
pub async fn import(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path((resource, id)): Path<(String, String)>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    if id != IMPORT_SEGMENT {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let resource = parse_resource(&resource)?;
    let mut multipart =
        multipart.map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?;

    let mut file = None;
    let mut fields = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| {
                tracing::error!(file_name = %file_name, error = %e, "Failed to read upload");
                AppError::BadRequest(anyhow::anyhow!("Failed to read file: {}", e))
            })?;
            file = Some(FileUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else if !name.is_empty() {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid field {}: {}", name, e)))?;
            fields.insert(name, Value::String(value));
        }
    }

    let file = file.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing file field")))?;

    tracing::info!(
        user_id = %identity.user_id,
        resource = %resource,
        file_name = %file.file_name,
        size = file.bytes.len(),
        "Importing into CRM"
    );

    let client = state.api_clients.client_for(&identity);
    Ok(respond(
        client.import_resource(resource, file, &fields).await,
        StatusCode::OK,
    ))
}
