use axum::{response::IntoResponse, Json};
use serde_json::json;
use tower_sessions::Session;

use crate::models::AuthState;

pub async fn index(session: Session) -> impl IntoResponse {
    let signed_in = matches!(AuthState::from_session(&session).await, AuthState::SignedIn(_));
    Json(json!({
        "service": "crm-portal",
        "signed_in": signed_in,
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}
