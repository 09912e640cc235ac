use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use crm_core::middleware::request_id_middleware;
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::guards::{require_auth, require_organization, require_super_admin};
use crate::handlers::{
    admin::admin_dashboard_handler,
    app::{health_check, index},
    auth::{login_handler, logout_handler, register_handler},
    crm,
    dashboard::{
        approve_join_request, dashboard_handler, list_join_requests, list_members,
        reject_join_request,
    },
    organizations::{create_organization, join_page, submit_join_request},
};
use crate::middleware::metrics_middleware;
use crate::routes;
use crate::AppState;

pub fn build_router(state: AppState, secure_cookies: bool) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)));

    // Signed in, no organization required.
    let onboarding = Router::new()
        .route(
            routes::ORGANIZATION_JOIN,
            get(join_page).post(submit_join_request),
        )
        .route("/organization", post(create_organization))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Signed in with an organization (or a super-admin).
    let dashboard = Router::new()
        .route(routes::DASHBOARD, get(dashboard_handler))
        .route("/dashboard/members", get(list_members))
        .route("/dashboard/join-requests", get(list_join_requests))
        .route(
            "/dashboard/join-requests/:id/approve",
            post(approve_join_request),
        )
        .route(
            "/dashboard/join-requests/:id/reject",
            post(reject_join_request),
        )
        .route("/dashboard/crm/:resource", get(crm::list).post(crm::create))
        // POST on an item path is only meaningful as `<resource>/import`;
        // every other method treats `import` as an ordinary item id.
        .route(
            "/dashboard/crm/:resource/:id",
            get(crm::get_one)
                .post(crm::import)
                .put(crm::update)
                .patch(crm::update)
                .delete(crm::delete),
        )
        .route_layer(from_fn_with_state(state.clone(), require_organization));

    let admin = Router::new()
        .route("/admin", get(admin_dashboard_handler))
        .route(
            "/admin/join-requests/:id/approve",
            post(approve_join_request),
        )
        .route("/admin/join-requests/:id/reject", post(reject_join_request))
        .route_layer(from_fn_with_state(state.clone(), require_super_admin));

    Router::new()
        .route(routes::HOME, get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(crate::handlers::metrics::metrics))
        .route(routes::LOGIN, post(login_handler))
        .route("/register", post(register_handler))
        .route("/logout", post(logout_handler))
        .merge(onboarding)
        .merge(dashboard)
        .merge(admin)
        .layer(session_layer)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(crm_core::middleware::REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
