//! Access guards.
//!
//! A guard sits in front of a protected view and decides, once, whether the
//! view may render. Every guard starts in [`GuardState::Checking`] and ends in
//! either [`GuardState::Authorized`] or [`GuardState::Redirecting`]; both are
//! terminal. A redirect is performed through the guard's [`Navigator`] and
//! fires at most once per guard.
//!
//! The variants differ only in their predicate and fallback route:
//!
//! | kind                 | predicate                         | fallback              |
//! |----------------------|-----------------------------------|-----------------------|
//! | `Authenticated`      | signed in                         | `/login`              |
//! | `OrganizationMember` | has an organization, or super-admin | `/organization/join` |
//! | `SuperAdmin`         | super-admin                       | `/dashboard`          |
//!
//! A signed-out caller always goes to `/login`. Resolution errors are treated
//! as a negative predicate.

pub mod middleware;

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::models::{AuthState, Identity};
use crate::routes;
use crate::services::metrics;
use crate::services::resolver::{OrganizationResolver, ResolveError};

pub use middleware::{require_auth, require_organization, require_super_admin, PendingRedirect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    Redirecting(&'static str),
}

impl GuardState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardState::Checking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Authenticated,
    OrganizationMember,
    SuperAdmin,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Authenticated => "authenticated",
            GuardKind::OrganizationMember => "organization_member",
            GuardKind::SuperAdmin => "super_admin",
        }
    }

    /// Where a signed-in caller goes when the predicate fails.
    pub fn fallback(&self) -> &'static str {
        match self {
            GuardKind::Authenticated => routes::LOGIN,
            GuardKind::OrganizationMember => routes::ORGANIZATION_JOIN,
            GuardKind::SuperAdmin => routes::DASHBOARD,
        }
    }
}

/// Performs the navigation side effect of a redirecting guard.
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, route: &'static str);
}

pub struct AccessGuard {
    kind: GuardKind,
    resolver: Arc<OrganizationResolver>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<GuardState>,
    mounted: CancellationToken,
}

impl AccessGuard {
    pub fn new(kind: GuardKind, resolver: Arc<OrganizationResolver>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            kind,
            resolver,
            navigator,
            state: Mutex::new(GuardState::Checking),
            mounted: CancellationToken::new(),
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> GuardState {
        self.lock_state().clone()
    }

    pub fn is_mounted(&self) -> bool {
        !self.mounted.is_cancelled()
    }

    /// Token cancelled on unmount, for callers that want to stop waiting early.
    pub fn mounted_token(&self) -> CancellationToken {
        self.mounted.clone()
    }

    /// Detaches the guard from its view. Results of checks still in flight
    /// are discarded and no redirect fires afterwards.
    pub fn unmount(&self) {
        let _state = self.lock_state();
        self.mounted.cancel();
    }

    /// Runs `children` only when the guard has authorized the view.
    pub fn render<T>(&self, children: impl FnOnce() -> T) -> Option<T> {
        (self.state() == GuardState::Authorized).then(children)
    }

    /// Advances the guard for the given auth state and returns the state it
    /// is in afterwards. Terminal states are sticky; `Loading` keeps the guard
    /// in `Checking`.
    pub async fn evaluate(&self, auth: &AuthState) -> GuardState {
        let current = self.state();
        if current.is_terminal() || !self.is_mounted() {
            return current;
        }

        let next = match auth {
            AuthState::Loading => return GuardState::Checking,
            AuthState::SignedOut => GuardState::Redirecting(routes::LOGIN),
            AuthState::SignedIn(identity) => match self.predicate(identity).await {
                Ok(true) => GuardState::Authorized,
                Ok(false) => GuardState::Redirecting(self.kind.fallback()),
                Err(e) => {
                    tracing::warn!(
                        guard = self.kind.as_str(),
                        user_id = %identity.user_id,
                        error = %e,
                        "Authorization check failed, denying access"
                    );
                    GuardState::Redirecting(self.kind.fallback())
                }
            },
        };

        self.settle(next)
    }

    async fn predicate(&self, identity: &Identity) -> Result<bool, ResolveError> {
        match self.kind {
            GuardKind::Authenticated => Ok(true),
            GuardKind::OrganizationMember => {
                if self
                    .resolver
                    .current_user_organization(identity)
                    .await?
                    .is_some()
                {
                    return Ok(true);
                }
                self.resolver.is_super_admin(&identity.email).await
            }
            GuardKind::SuperAdmin => self.resolver.is_super_admin(&identity.email).await,
        }
    }

    fn settle(&self, next: GuardState) -> GuardState {
        let mut state = self.lock_state();

        if self.mounted.is_cancelled() {
            tracing::debug!(guard = self.kind.as_str(), "Discarding result for unmounted guard");
            return state.clone();
        }
        // A concurrent evaluation got here first.
        if state.is_terminal() {
            return state.clone();
        }

        *state = next.clone();

        let outcome = match &next {
            GuardState::Authorized => "authorized",
            GuardState::Redirecting(_) => "redirected",
            GuardState::Checking => "checking",
        };
        metrics::record_guard_decision(self.kind.as_str(), outcome);

        if let GuardState::Redirecting(route) = next {
            tracing::info!(guard = self.kind.as_str(), route = route, "Access guard redirecting");
            self.navigator.redirect_to(route);
        }

        next
    }
}
