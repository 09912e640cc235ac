use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::routes;

/// Session keys written at login and cleared at logout.
pub mod session_keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const USER_ID: &str = "user_id";
    pub const EMAIL: &str = "email";
}

/// Authorization tier of a user, independent of organization membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    #[default]
    Regular,
}

/// The authenticated caller, as established by the auth provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
}

impl Identity {
    /// Binds the identity to the session under [`session_keys`].
    pub async fn save_to(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        session
            .insert(session_keys::ACCESS_TOKEN, &self.access_token)
            .await?;
        session.insert(session_keys::USER_ID, self.user_id).await?;
        session.insert(session_keys::EMAIL, &self.email).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// What the auth provider currently knows about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Identity not resolved yet.
    Loading,
    SignedOut,
    SignedIn(Identity),
}

impl AuthState {
    /// Reads the identity stored in the session. Missing or unreadable keys
    /// mean the caller is signed out.
    pub async fn from_session(session: &Session) -> Self {
        let access_token: Option<String> = session
            .get(session_keys::ACCESS_TOKEN)
            .await
            .unwrap_or(None);
        let user_id: Option<Uuid> = session.get(session_keys::USER_ID).await.unwrap_or(None);
        let email: Option<String> = session.get(session_keys::EMAIL).await.unwrap_or(None);

        match (access_token, user_id, email) {
            (Some(access_token), Some(user_id), Some(email)) => AuthState::SignedIn(Identity {
                user_id,
                email,
                access_token,
            }),
            _ => AuthState::SignedOut,
        }
    }
}

/// Public view of the signed-in user.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl UserProfile {
    pub fn name(&self) -> String {
        self.email.split('@').next().unwrap_or("User").to_string()
    }
}

/// Authenticated user extracted from request extensions (inserted by the
/// access guards) or, outside a guard, from the session.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser(identity.clone()));
        }

        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(status, msg)| (status, msg).into_response())?;

        match AuthState::from_session(&session).await {
            AuthState::SignedIn(identity) => Ok(AuthUser(identity)),
            _ => Err(Redirect::to(routes::LOGIN).into_response()),
        }
    }
}
