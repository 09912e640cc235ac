use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::{Arc, Mutex};
use tower_sessions::Session;

use super::{AccessGuard, GuardKind, GuardState, Navigator};
use crate::models::AuthState;
use crate::routes;
use crate::AppState;

/// Navigator for server-side guards: records the route so the middleware can
/// answer with a redirect response.
#[derive(Default)]
pub struct PendingRedirect(Mutex<Option<&'static str>>);

impl PendingRedirect {
    pub fn take(&self) -> Option<&'static str> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Navigator for PendingRedirect {
    fn redirect_to(&self, route: &'static str) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(route);
    }
}

async fn enforce(
    kind: GuardKind,
    state: AppState,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth = AuthState::from_session(&session).await;
    let navigator = Arc::new(PendingRedirect::default());
    let guard = AccessGuard::new(kind, state.resolver.clone(), navigator.clone());

    match guard.evaluate(&auth).await {
        GuardState::Authorized => {
            if let AuthState::SignedIn(identity) = auth {
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
        _ => {
            let route = navigator.take().unwrap_or(routes::LOGIN);
            Redirect::to(route).into_response()
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    session: Session,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(GuardKind::Authenticated, state, session, request, next).await
}

pub async fn require_organization(
    State(state): State<AppState>,
    session: Session,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(GuardKind::OrganizationMember, state, session, request, next).await
}

pub async fn require_super_admin(
    State(state): State<AppState>,
    session: Session,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(GuardKind::SuperAdmin, state, session, request, next).await
}
