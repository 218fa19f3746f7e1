//! Auth backend seam.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` talks to the REST API only through [`AuthBackend`]. The
//! production implementation is [`http::HttpBackend`]; [`mock::MockBackend`]
//! is an in-memory double with demo accounts for tests and local demos.

pub mod http;
#[cfg(any(test, feature = "test-doubles"))]
pub mod mock;

use crate::error::AuthError;
use crate::types::{AuthResponse, Credentials, ProfileUpdate, RegisterProfile, User};

/// REST auth API consumed by the session manager.
///
/// Implementations map transport failures and timeouts to
/// [`AuthError::Network`].
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError>;

    /// `POST /auth/register`.
    async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, AuthError>;

    /// `POST /auth/refresh`, authenticated with the current token. Returns the new token.
    async fn refresh(&self, token: &str) -> Result<String, AuthError>;

    /// `GET /auth/me`.
    async fn current_user(&self, token: &str) -> Result<User, AuthError>;

    /// `PUT /users/profile` with a partial profile. Returns the stored user.
    async fn update_profile(&self, token: &str, patch: &ProfileUpdate) -> Result<User, AuthError>;
}
