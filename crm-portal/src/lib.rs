pub mod config;
pub mod error;
pub mod guards;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;
pub mod utils;

use reqwest::Client;
use services::{
    auth_client::AuthClient, backend::OrganizationBackend, client_registry::ClientRegistry,
    join_requests::JoinRequestService, organizations::OrganizationService,
    resolver::OrganizationResolver, RestBackend,
};
use std::sync::Arc;

use crate::config::Settings;

/// Shared application state containing service clients
#[derive(Clone)]
pub struct AppState {
    pub auth_client: Arc<AuthClient>,
    pub resolver: Arc<OrganizationResolver>,
    pub organizations: Arc<OrganizationService>,
    pub join_requests: Arc<JoinRequestService>,
    pub api_clients: Arc<ClientRegistry>,
}

impl AppState {
    /// Wires every service against the configured backend and CRM API.
    pub fn from_settings(settings: &Settings) -> Self {
        let http = Client::new();
        let backend = Arc::new(RestBackend::with_client(http.clone(), settings.backend.clone()));
        let auth_client = Arc::new(AuthClient::new(settings.backend.clone()));

        Self::new(auth_client, backend, http, settings.api.base_url.clone())
    }

    pub fn new(
        auth_client: Arc<AuthClient>,
        backend: Arc<dyn OrganizationBackend>,
        http: Client,
        api_base_url: String,
    ) -> Self {
        let resolver = Arc::new(OrganizationResolver::new(backend));

        Self {
            auth_client,
            organizations: Arc::new(OrganizationService::new(resolver.clone())),
            join_requests: Arc::new(JoinRequestService::new(resolver.clone())),
            api_clients: Arc::new(ClientRegistry::new(http, api_base_url, resolver.clone())),
            resolver,
        }
    }
}
