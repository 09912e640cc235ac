use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use crm_core::error::AppError;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use validator::Validate;

use crate::models::{AuthState, UserProfile};
use crate::routes;
use crate::AppState;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Session store error: {}", e))
}

fn hx_redirect(route: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("HX-Redirect", HeaderValue::from_static(route));
    headers
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Form(payload): Form<LoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let identity = state
        .auth_client
        .sign_in(&payload.email, &payload.password)
        .await?;

    // A new session must not inherit a tenant cached for a previous one.
    state.api_clients.evict(identity.user_id).await;

    session.cycle_id().await.map_err(session_error)?;
    identity.save_to(&session).await.map_err(session_error)?;

    let role = state.resolver.resolve_role(&identity.email).await?;

    tracing::info!(
        user_id = %identity.user_id,
        email = %identity.email,
        "User logged in successfully"
    );

    let profile = UserProfile {
        id: identity.user_id,
        email: identity.email,
        role,
    };
    Ok((StatusCode::OK, hx_redirect(routes::DASHBOARD), Json(json!({ "user": profile }))).into_response())
}

pub async fn register_handler(
    State(state): State<AppState>,
    Form(payload): Form<RegisterRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    state
        .auth_client
        .sign_up(&payload.email, &payload.password)
        .await?;

    tracing::info!(email = %payload.email, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Registration successful. Please check your email." })),
    )
        .into_response())
}

pub async fn logout_handler(State(state): State<AppState>, session: Session) -> Response {
    if let AuthState::SignedIn(identity) = AuthState::from_session(&session).await {
        // Logout never fails on revocation; the session is cleared regardless.
        if let Err(e) = state.auth_client.sign_out(&identity.access_token).await {
            tracing::error!(user_id = %identity.user_id, error = %e, "Failed to revoke token during logout");
        }
        state.api_clients.evict(identity.user_id).await;
        tracing::info!(user_id = %identity.user_id, "User logged out");
    }

    if let Err(e) = session.flush().await {
        tracing::error!(error = %e, "Failed to delete session during logout");
    }

    (StatusCode::OK, hx_redirect(routes::HOME), "").into_response()
}
