//! Route guard for protected pages.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected subtree owns one `RouteGuard`. Before the subtree renders,
//! the host awaits [`RouteGuard::evaluate`] with the current path and renders
//! only on [`GuardState::Authorized`]. Redirects go through the session's
//! navigator.
//!
//! DESIGN
//! ======
//! Evaluation waits for hydration, asks the session to verify (and refresh)
//! the credential, then applies the pure [`decide`] policy. Decisions are
//! terminal for the lifetime of the guard; a route change builds a new guard.
//! A guard that is unmounted mid-evaluation drops its decision.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::redirect::{self, LOGIN};
use crate::session::SessionManager;
use crate::types::{Role, User};

/// Lifecycle of one guard evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardState {
    /// Waiting for hydration or the auth check. Render nothing.
    Checking,
    /// Navigation to the route has been issued. Render nothing.
    Redirecting(String),
    /// Render the protected subtree.
    Authorized,
}

impl GuardState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Checking)
    }
}

/// Outcome of the role/onboarding policy for a verified user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(&'static str),
}

/// Role and onboarding policy for a verified `user` visiting `path`.
///
/// A role mismatch sends the user to their own destination. An unfinished
/// onboarding sends them to the role's onboarding flow unless they are
/// already inside it.
#[must_use]
pub fn decide(user: &User, required_role: Option<Role>, path: &str) -> Decision {
    if required_role.is_some_and(|role| role != user.role) {
        return Decision::Redirect(redirect::destination_for(user));
    }
    if !user.onboarding_completed && !redirect::is_onboarding_path(path) {
        if let Some(route) = redirect::onboarding_for(user.role) {
            return Decision::Redirect(route);
        }
    }
    Decision::Allow
}

// =============================================================================
// MOUNT HANDLE
// =============================================================================

/// Cancels a guard's pending decision when its subtree goes away.
#[derive(Clone, Debug)]
pub struct MountHandle {
    mounted: Arc<AtomicBool>,
}

impl MountHandle {
    /// Drop any decision the guard has not applied yet.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

// =============================================================================
// ROUTE GUARD
// =============================================================================

/// Gate for one protected subtree.
pub struct RouteGuard {
    session: SessionManager,
    required_role: Option<Role>,
    state: GuardState,
    mounted: Arc<AtomicBool>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(session: SessionManager, required_role: Option<Role>) -> Self {
        Self { session, required_role, state: GuardState::Checking, mounted: Arc::new(AtomicBool::new(true)) }
    }

    #[must_use]
    pub fn state(&self) -> &GuardState {
        &self.state
    }

    #[must_use]
    pub fn required_role(&self) -> Option<Role> {
        self.required_role
    }

    #[must_use]
    pub fn mount_handle(&self) -> MountHandle {
        MountHandle { mounted: Arc::clone(&self.mounted) }
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Decide whether the subtree at `path` may render, issuing a redirect
    /// when it may not.
    ///
    /// Returns the stored state without re-checking once a decision has been
    /// made. Returns `Checking` if the guard was unmounted before deciding.
    pub async fn evaluate(&mut self, path: &str) -> GuardState {
        if self.state.is_terminal() {
            return self.state.clone();
        }

        let mut status = self.session.subscribe();
        let hydrated = status.wait_for(|s| !s.loading).await.is_ok();
        if !hydrated || !self.is_mounted() {
            return GuardState::Checking;
        }

        let verified = if self.session.check_auth().await { self.session.current_user().await } else { None };
        if !self.is_mounted() {
            debug!(path, "guard unmounted during auth check; dropping decision");
            return GuardState::Checking;
        }

        let next = match verified {
            None => {
                debug!(path, "guard: not authenticated");
                GuardState::Redirecting(LOGIN.to_owned())
            }
            Some(user) => match decide(&user, self.required_role, path) {
                Decision::Allow => {
                    debug!(path, user_id = %user.id, "guard: authorized");
                    GuardState::Authorized
                }
                Decision::Redirect(route) => {
                    debug!(path, user_id = %user.id, role = %user.role, route, "guard: redirecting");
                    GuardState::Redirecting(route.to_owned())
                }
            },
        };
        if let GuardState::Redirecting(route) = &next {
            self.session.navigate(route);
        }
        self.state = next.clone();
        next
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
