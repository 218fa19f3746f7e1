//! In-memory auth backend with demo accounts.
//!
//! A test double, never a production path. Tokens are unsigned JWT-shaped
//! strings with a real `exp` claim so expiry handling is exercised end to end.
//! Knobs let tests force failures, delay refreshes and issue pre-expired tokens.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use serde_json::Map;
use uuid::Uuid;

use super::AuthBackend;
use crate::error::AuthError;
use crate::token::{now_unix, unsigned_token};
use crate::types::{
    AuthResponse, Credentials, ProfileUpdate, RegisterProfile, Role, User, strip_immutable,
};

/// Password shared by the seeded demo accounts.
pub const DEMO_PASSWORD: &str = "password123";

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

struct Account {
    password: String,
    user: User,
}

#[derive(Default)]
struct MockState {
    /// Accounts keyed by lowercase email.
    accounts: HashMap<String, Account>,
    /// Issued token -> user id.
    tokens: HashMap<String, String>,
    /// Every token ever issued, in order.
    issued: Vec<String>,
}

/// Demo-account backend.
pub struct MockBackend {
    state: Mutex<MockState>,
    token_ttl_secs: AtomicI64,
    refresh_delay_ms: AtomicU64,
    fail_refresh: AtomicBool,
    fail_network: AtomicBool,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    me_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

fn nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn demo_user(id: &str, email: &str, name: &str, role: Role, onboarding_completed: bool) -> User {
    User {
        id: id.to_owned(),
        email: email.to_owned(),
        name: name.to_owned(),
        role,
        onboarding_completed,
        profile_completed: onboarding_completed,
        extra: Map::new(),
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Empty backend, no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            token_ttl_secs: AtomicI64::new(DEFAULT_TOKEN_TTL_SECS),
            refresh_delay_ms: AtomicU64::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_network: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    /// Backend seeded with one account per role, all using [`DEMO_PASSWORD`]:
    /// `employee@example.com` (onboarding pending), `employer@example.com` and
    /// `admin@example.com` (onboarding done).
    #[must_use]
    pub fn with_demo_accounts() -> Self {
        let backend = Self::new();
        backend.seed_user(
            demo_user("demo-employee", "employee@example.com", "Demo Employee", Role::Employee, false),
            DEMO_PASSWORD,
        );
        backend.seed_user(
            demo_user("demo-employer", "employer@example.com", "Demo Employer", Role::Employer, true),
            DEMO_PASSWORD,
        );
        backend.seed_user(
            demo_user("demo-admin", "admin@example.com", "Demo Admin", Role::Admin, true),
            DEMO_PASSWORD,
        );
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace an account.
    pub fn seed_user(&self, user: User, password: &str) {
        let key = user.email.to_ascii_lowercase();
        self.lock()
            .accounts
            .insert(key, Account { password: password.to_owned(), user });
    }

    /// Mint a token for an existing account without going through login.
    #[must_use]
    pub fn issue_token_for(&self, email: &str) -> Option<String> {
        let user_id = self
            .lock()
            .accounts
            .get(&email.to_ascii_lowercase())?
            .user
            .id
            .clone();
        Some(self.issue(&user_id))
    }

    /// Lifetime of newly issued tokens. Negative values issue expired tokens.
    pub fn set_token_ttl_secs(&self, secs: i64) {
        self.token_ttl_secs.store(secs, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.refresh_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail as if the server were unreachable.
    pub fn set_fail_network(&self, fail: bool) {
        self.fail_network.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Every token issued so far, oldest first.
    #[must_use]
    pub fn issued_tokens(&self) -> Vec<String> {
        self.lock().issued.clone()
    }

    /// Stored account record for `email`.
    #[must_use]
    pub fn account(&self, email: &str) -> Option<User> {
        self.lock()
            .accounts
            .get(&email.to_ascii_lowercase())
            .map(|a| a.user.clone())
    }

    fn issue(&self, user_id: &str) -> String {
        let exp = now_unix() + self.token_ttl_secs.load(Ordering::SeqCst);
        let token = unsigned_token(user_id, exp, &nonce());
        let mut state = self.lock();
        state.tokens.insert(token.clone(), user_id.to_owned());
        state.issued.push(token.clone());
        token
    }

    fn check_network(&self) -> Result<(), AuthError> {
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(AuthError::Network("mock backend unreachable".into()));
        }
        Ok(())
    }

    fn user_for_token(&self, token: &str) -> Result<User, AuthError> {
        let state = self.lock();
        let user_id = state.tokens.get(token).ok_or(AuthError::NotAuthenticated)?;
        state
            .accounts
            .values()
            .find(|a| &a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[async_trait::async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.check_network()?;
        let user = {
            let state = self.lock();
            let account = state
                .accounts
                .get(&credentials.email.to_ascii_lowercase())
                .ok_or(AuthError::InvalidCredentials)?;
            if account.password != credentials.password {
                return Err(AuthError::InvalidCredentials);
            }
            account.user.clone()
        };
        let token = self.issue(&user.id);
        Ok(AuthResponse { user, token })
    }

    async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, AuthError> {
        self.check_network()?;
        let key = profile.email.to_ascii_lowercase();
        if self.lock().accounts.contains_key(&key) {
            return Err(AuthError::Validation("Email already registered".into()));
        }
        let user = demo_user(&Uuid::new_v4().to_string(), &profile.email, &profile.name, profile.role, false);
        self.seed_user(user.clone(), &profile.password);
        let token = self.issue(&user.id);
        Ok(AuthResponse { user, token })
    }

    async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_network()?;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::NotAuthenticated);
        }
        let user = self.user_for_token(token)?;
        Ok(self.issue(&user.id))
    }

    async fn current_user(&self, token: &str) -> Result<User, AuthError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.check_network()?;
        self.user_for_token(token)
    }

    async fn update_profile(&self, token: &str, patch: &ProfileUpdate) -> Result<User, AuthError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_network()?;
        let current = self.user_for_token(token)?;
        let updated = current
            .merged(&strip_immutable(patch))
            .map_err(|e| AuthError::Validation(e.to_string()))?;
        let mut state = self.lock();
        if let Some(account) = state.accounts.get_mut(&current.email.to_ascii_lowercase()) {
            account.user = updated.clone();
        }
        Ok(updated)
    }
}
