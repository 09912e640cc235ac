use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::Identity;
use crate::services::api_client::OrgApiClient;
use crate::services::resolver::OrganizationResolver;
use crate::utils::jwt::decode_jwt_claims;

/// Matches the session inactivity expiry.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

struct RegistryEntry {
    client: Arc<OrgApiClient>,
    /// `exp` of the access token, when it is a readable JWT.
    expires_at: Option<i64>,
    last_seen: Instant,
}

impl RegistryEntry {
    fn is_stale(&self, now: Instant, unix_now: i64, idle_timeout: Duration) -> bool {
        let expired = self.expires_at.is_some_and(|exp| exp <= unix_now);
        expired || now.duration_since(self.last_seen) >= idle_timeout
    }
}

/// One [`OrgApiClient`] per signed-in user, so the resolved tenant id is
/// shared across that user's requests.
///
/// Entries are evicted on login and logout; the next request builds a fresh
/// client and resolves the organization again. Sessions that simply expire
/// never log out, so [`prune`](Self::prune) drops entries whose token has
/// expired or that have been idle longer than the session would live.
pub struct ClientRegistry {
    http: Client,
    base_url: String,
    resolver: Arc<OrganizationResolver>,
    idle_timeout: Duration,
    clients: DashMap<Uuid, RegistryEntry>,
}

impl ClientRegistry {
    pub fn new(http: Client, base_url: impl Into<String>, resolver: Arc<OrganizationResolver>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            resolver,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            clients: DashMap::new(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn client_for(&self, identity: &Identity) -> Arc<OrgApiClient> {
        if let Some(mut entry) = self.clients.get_mut(&identity.user_id) {
            // A refreshed token means a new session; don't reuse the old client.
            if entry.client.identity().access_token == identity.access_token {
                entry.last_seen = Instant::now();
                return entry.client.clone();
            }
        }

        let client = Arc::new(OrgApiClient::new(
            self.http.clone(),
            self.base_url.clone(),
            self.resolver.clone(),
            identity.clone(),
        ));
        let expires_at = decode_jwt_claims(&identity.access_token)
            .ok()
            .map(|claims| claims.exp);
        self.clients.insert(
            identity.user_id,
            RegistryEntry {
                client: client.clone(),
                expires_at,
                last_seen: Instant::now(),
            },
        );
        client
    }

    /// Drops the user's client, clearing its cached organization id.
    pub async fn evict(&self, user_id: Uuid) {
        if let Some((_, entry)) = self.clients.remove(&user_id) {
            entry.client.reset_organization().await;
            tracing::debug!(user_id = %user_id, "Evicted API client");
        }
    }

    /// Removes entries with an expired token or past the idle timeout.
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let unix_now = chrono::Utc::now().timestamp();
        let before = self.clients.len();
        self.clients
            .retain(|_, entry| !entry.is_stale(now, unix_now, self.idle_timeout));
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.clients.len(), "Pruned API clients");
        }
        removed
    }

    /// Runs [`prune`](Self::prune) every `every` until the runtime shuts down.
    pub fn spawn_pruner(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                self.prune();
            }
        })
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.clients.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
