//! Session manager: who is logged in, and is their credential still valid.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` is a cheap `Clone` handle over shared state. The session
//! record (user + token) sits behind one async mutex that every operation
//! holds across its backend call, so login, logout, refresh, profile updates
//! and auth checks never interleave partial writes. Derived status is
//! published on a `watch` channel for route guards.
//!
//! ERROR HANDLING
//! ==============
//! `login`, `register` and `update_user` return typed errors and leave the
//! session as it was. `check_auth` never errors: any failure clears the
//! session and yields `false`. `logout` always succeeds; storage failures are
//! logged.

mod sweep;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use sweep::RefreshOutcome;

use crate::backend::AuthBackend;
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::redirect;
use crate::shell::{LiveConnection, Navigator, Notice, Notifier};
use crate::storage::{PersistedSession, SessionStorage, SessionStore, StoredSession};
use crate::token;
use crate::types::{AuthResponse, Credentials, ProfileUpdate, RegisterProfile, Role, User, strip_immutable};

/// Derived session status, recomputed after every mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    /// True until the session has been hydrated from storage.
    pub loading: bool,
    pub authenticated: bool,
}

/// External collaborators injected into the manager.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn AuthBackend>,
    pub storage: Arc<dyn SessionStorage>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Default)]
struct Session {
    user: Option<User>,
    token: Option<String>,
}

impl Session {
    fn is_complete(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    fn is_empty(&self) -> bool {
        self.user.is_none() && self.token.is_none()
    }

    fn clear(&mut self) {
        self.user = None;
        self.token = None;
    }
}

struct Shared {
    backend: Arc<dyn AuthBackend>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    store: SessionStore,
    config: SessionConfig,
    session: tokio::sync::Mutex<Session>,
    status: watch::Sender<SessionStatus>,
    connections: Mutex<Vec<Arc<dyn LiveConnection>>>,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Single source of truth for the signed-in user. Clone freely; all clones
/// share one session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager in the `loading` state. Call [`start`](Self::start)
    /// to hydrate from storage.
    #[must_use]
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let store = SessionStore::new(collaborators.storage, &config.storage_namespace);
        let (status, _) = watch::channel(SessionStatus { loading: true, authenticated: false });
        Self {
            shared: Arc::new(Shared {
                backend: collaborators.backend,
                navigator: collaborators.navigator,
                notifier: collaborators.notifier,
                store,
                config,
                session: tokio::sync::Mutex::new(Session::default()),
                status,
                connections: Mutex::new(Vec::new()),
                sweep: Mutex::new(None),
            }),
        }
    }

    /// Hydrate from persistent storage and start the refresh sweep if a
    /// session was restored. Partial or corrupt persisted state is discarded.
    pub async fn start(&self) {
        let mut session = self.shared.session.lock().await;
        match self.shared.store.load() {
            Ok(StoredSession::Complete(PersistedSession { token, user })) => {
                info!(user_id = %user.id, role = %user.role, "session restored from storage");
                session.user = Some(user);
                session.token = Some(token);
            }
            Ok(StoredSession::Empty) => {
                debug!("no persisted session");
                session.clear();
            }
            Ok(StoredSession::Invalid) => {
                warn!("discarding incomplete persisted session");
                session.clear();
                if let Err(e) = self.shared.store.clear() {
                    warn!(error = %e, "failed to clear persisted session");
                }
            }
            Err(e) => {
                warn!(error = %e, "session storage unreadable; starting signed out");
                session.clear();
            }
        }
        let authenticated = self.publish(&session);
        drop(session);
        if authenticated {
            self.ensure_sweep();
        }
    }

    // -------------------------------------------------------------------------
    // accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Watch status changes (hydration finished, signed in, signed out).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Whether a user and token are currently held. Does not check expiry;
    /// guards must call [`check_auth`](Self::check_auth).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status().authenticated
    }

    pub async fn current_user(&self) -> Option<User> {
        self.shared.session.lock().await.user.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.shared.session.lock().await.token.clone()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Register a live connection to be closed on logout.
    pub fn attach_connection(&self, connection: Arc<dyn LiveConnection>) {
        self.shared
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection);
    }

    // -------------------------------------------------------------------------
    // operations
    // -------------------------------------------------------------------------

    /// Sign in with email and password, then redirect to the user's
    /// role destination.
    ///
    /// # Errors
    ///
    /// `Validation` for empty fields, `InvalidCredentials` when the backend
    /// rejects the pair, `Network`/`Backend` on transport failures and
    /// `Storage` if the session cannot be persisted. The session is unchanged
    /// on error and an error notice is shown.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let credentials = Credentials { email: email.trim().to_owned(), password: password.to_owned() };
        let result = self.login_inner(&credentials).await;
        self.finish_sign_in("login", result, "Signed in successfully.")
    }

    async fn login_inner(&self, credentials: &Credentials) -> Result<User, AuthError> {
        if credentials.email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::Validation("Email and password are required.".into()));
        }
        let mut session = self.shared.session.lock().await;
        let response = self.shared.backend.login(credentials).await?;
        self.establish(&mut session, response)
    }

    /// Create an account, sign in, and redirect to the role's onboarding flow.
    ///
    /// # Errors
    ///
    /// Same contract as [`login`](Self::login); `Validation` also covers
    /// missing fields, self-registration as `admin`, and backend rejections
    /// such as a duplicate email.
    pub async fn register(&self, profile: RegisterProfile) -> Result<User, AuthError> {
        let profile = RegisterProfile {
            name: profile.name.trim().to_owned(),
            email: profile.email.trim().to_owned(),
            ..profile
        };
        let result = self.register_inner(&profile).await;
        self.finish_sign_in("register", result, "Account created. Let's finish setting up your profile.")
    }

    async fn register_inner(&self, profile: &RegisterProfile) -> Result<User, AuthError> {
        if profile.name.is_empty() || profile.email.is_empty() || profile.password.is_empty() {
            return Err(AuthError::Validation("Name, email and password are required.".into()));
        }
        if profile.role == Role::Admin {
            return Err(AuthError::Validation("Admin accounts cannot be self-registered.".into()));
        }
        let mut session = self.shared.session.lock().await;
        let mut response = self.shared.backend.register(profile).await?;
        response.user.onboarding_completed = false;
        self.establish(&mut session, response)
    }

    /// Store a fresh sign-in, rolling back to the previous session if it
    /// cannot be persisted.
    fn establish(&self, session: &mut Session, response: AuthResponse) -> Result<User, AuthError> {
        let AuthResponse { user, token } = response;
        let persisted = PersistedSession { token, user };
        if let Err(e) = self.shared.store.save(&persisted) {
            if let (Some(user), Some(token)) = (session.user.clone(), session.token.clone()) {
                if let Err(e) = self.shared.store.save(&PersistedSession { token, user }) {
                    warn!(error = %e, "failed to restore previous persisted session");
                }
            }
            return Err(e.into());
        }
        let PersistedSession { token, user } = persisted;
        if session.user.as_ref().is_some_and(|previous| previous.id != user.id) {
            debug!(user_id = %user.id, "new principal replaces session; closing previous connections");
            self.disconnect_all();
        }
        session.user = Some(user.clone());
        session.token = Some(token);
        self.publish(session);
        Ok(user)
    }

    fn finish_sign_in(&self, op: &str, result: Result<User, AuthError>, success: &str) -> Result<User, AuthError> {
        match &result {
            Ok(user) => {
                info!(op, user_id = %user.id, role = %user.role, "signed in");
                self.ensure_sweep();
                self.shared.notifier.notify(Notice::success(success));
                self.shared.navigator.navigate(redirect::destination_for(user));
            }
            Err(e) => {
                info!(op, code = e.error_code(), "sign-in failed");
                self.shared.notifier.notify(Notice::error(e.user_message()));
            }
        }
        result
    }

    /// Sign out: clear memory and storage, close live connections, stop the
    /// refresh sweep and go to the login page. Without a session it only
    /// closes leftover connections and does not navigate.
    pub async fn logout(&self) {
        let mut session = self.shared.session.lock().await;
        if session.is_empty() {
            if let Err(e) = self.shared.store.clear() {
                warn!(error = %e, "failed to clear persisted session on logout");
            }
            drop(session);
            self.disconnect_all();
            return;
        }
        let user_id = session.user.as_ref().map(|u| u.id.clone());
        session.clear();
        if let Err(e) = self.shared.store.clear() {
            warn!(error = %e, "failed to clear persisted session on logout");
        }
        self.publish(&session);
        drop(session);

        self.stop_sweep();
        self.disconnect_all();
        info!(user_id = user_id.as_deref().unwrap_or(""), "signed out");
        self.shared.navigator.navigate(redirect::LOGIN);
    }

    /// Shallow-merge `partial` into the current user via the backend.
    ///
    /// `id` and `role` in `partial` are ignored, both locally and in the
    /// backend's echo.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `Validation` for a malformed
    /// patch or a backend rejection, `Network`/`Backend` on transport
    /// failures, `Storage` if the merged record cannot be persisted. The
    /// session is unchanged on error.
    pub async fn update_user(&self, partial: ProfileUpdate) -> Result<User, AuthError> {
        let mut session = self.shared.session.lock().await;
        let (Some(current), Some(token)) = (session.user.clone(), session.token.clone()) else {
            return Err(AuthError::NotAuthenticated);
        };

        let patch = strip_immutable(&partial);
        if patch.len() != partial.len() {
            debug!(user_id = %current.id, "ignoring immutable keys in profile update");
        }
        let merged = current
            .merged(&patch)
            .map_err(|e| AuthError::Validation(format!("invalid profile update: {e}")))?;

        let echoed = self.shared.backend.update_profile(&token, &patch).await?;
        let updated = merged
            .merged(&echoed.to_patch())
            .map_err(|e| AuthError::Validation(format!("invalid profile from server: {e}")))?;

        self.shared.store.save_user(&updated)?;
        session.user = Some(updated.clone());
        self.publish(&session);
        debug!(user_id = %updated.id, "profile updated");
        Ok(updated)
    }

    /// Verify that a usable session exists, refreshing an expired token once
    /// and resolving the user from memory, storage or the backend.
    ///
    /// Returns `false` and leaves the session cleared and live connections
    /// closed on any failure. Shows no notice; callers redirect to the login
    /// page.
    pub async fn check_auth(&self) -> bool {
        let mut session = self.shared.session.lock().await;
        match self.verify(&mut session).await {
            Ok(()) => {
                self.publish(&session);
                drop(session);
                self.ensure_sweep();
                true
            }
            Err(e) => {
                debug!(code = e.error_code(), "auth check failed; clearing session");
                session.clear();
                if let Err(e) = self.shared.store.clear() {
                    warn!(error = %e, "failed to clear persisted session");
                }
                self.publish(&session);
                drop(session);
                self.stop_sweep();
                self.disconnect_all();
                false
            }
        }
    }

    async fn verify(&self, session: &mut Session) -> Result<(), AuthError> {
        let token = match session.token.clone() {
            Some(token) => token,
            None => self.shared.store.load_token()?.ok_or(AuthError::NotAuthenticated)?,
        };

        let token = if token::is_expired(&token, self.shared.config.leeway_secs()) {
            let fresh = self.shared.backend.refresh(&token).await.map_err(|e| {
                warn!(error = %e, "token refresh failed during auth check");
                AuthError::TokenExpiredUnrecoverable
            })?;
            if token::is_expired(&fresh, 0) {
                return Err(AuthError::TokenExpiredUnrecoverable);
            }
            self.shared.store.save_token(&fresh)?;
            debug!("token refreshed during auth check");
            fresh
        } else {
            token
        };
        session.token = Some(token.clone());

        if session.user.is_none() {
            let user = match self.shared.store.load_user()? {
                Some(user) => user,
                None => {
                    let user = self.shared.backend.current_user(&token).await?;
                    self.shared.store.save_user(&user)?;
                    user
                }
            };
            session.user = Some(user);
        }
        Ok(())
    }

    /// Stop the refresh sweep (application exit or unmount).
    pub fn shutdown(&self) {
        self.stop_sweep();
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    /// Publish derived status; returns `authenticated`.
    fn publish(&self, session: &Session) -> bool {
        let next = SessionStatus { loading: false, authenticated: session.is_complete() };
        self.shared.status.send_if_modified(|status| {
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
        next.authenticated
    }

    /// Route through the injected navigator (used by guards).
    pub(crate) fn navigate(&self, path: &str) {
        self.shared.navigator.navigate(path);
    }

    fn ensure_sweep(&self) {
        let mut sweep = self.shared.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if sweep.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *sweep = Some(sweep::spawn(Arc::downgrade(&self.shared), self.shared.config.refresh_interval));
    }

    fn stop_sweep(&self) {
        let handle = self
            .shared
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn sweep_running(&self) -> bool {
        self.shared
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn disconnect_all(&self) {
        let connections: Vec<_> = self
            .shared
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for connection in connections {
            connection.disconnect();
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
