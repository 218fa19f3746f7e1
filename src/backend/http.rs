//! REST client for the marketplace auth API.
//!
//! Thin reqwest wrapper. Status-to-error mapping lives in pure helpers so it
//! can be tested without a server.
//!
//! ERROR HANDLING
//! ==============
//! Timeouts, connection failures and unreadable bodies all become
//! `AuthError::Network`; the session layer treats them as ordinary failures.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::AuthBackend;
use crate::config::ApiConfig;
use crate::error::AuthError;
use crate::types::{
    AuthResponse, Credentials, ProfileUpdate, RegisterProfile, TokenResponse, User, UserEnvelope,
};

/// Backend endpoints, used for URL building and error mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    Login,
    Register,
    Refresh,
    Me,
    UpdateProfile,
}

impl Call {
    fn path(self) -> &'static str {
        match self {
            Self::Login => "/auth/login",
            Self::Register => "/auth/register",
            Self::Refresh => "/auth/refresh",
            Self::Me => "/auth/me",
            Self::UpdateProfile => "/users/profile",
        }
    }
}

/// Pull a human-readable reason out of an error body (`message` or `error`).
fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .map(str::to_owned)
        .filter(|msg| !msg.trim().is_empty())
}

/// Map a non-success status to the session error taxonomy.
fn status_error(call: Call, status: u16, body: &str) -> AuthError {
    match (call, status) {
        (Call::Login, 401 | 403) => AuthError::InvalidCredentials,
        (_, 401) => AuthError::NotAuthenticated,
        (_, 400 | 409 | 422) => {
            AuthError::Validation(error_message_from_body(body).unwrap_or_else(|| "request was rejected".to_owned()))
        }
        _ => AuthError::Backend {
            status,
            message: error_message_from_body(body).unwrap_or_else(|| body.chars().take(200).collect()),
        },
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    config: ApiConfig,
}

impl HttpBackend {
    /// Build a client with the configured request and connect timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::Network(format!("http client build failed: {e}")))?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn execute<T: DeserializeOwned>(&self, call: Call, request: reqwest::RequestBuilder) -> Result<T, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        debug!(endpoint = call.path(), status, "auth backend response");

        if !(200..300).contains(&status) {
            return Err(status_error(call, status, &text));
        }

        serde_json::from_str(&text).map_err(|e| AuthError::Network(format!("unexpected response: {e}")))
    }

    fn post(&self, call: Call) -> reqwest::RequestBuilder {
        self.http.post(self.config.endpoint(call.path()))
    }
}

#[async_trait::async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        self.execute(Call::Login, self.post(Call::Login).json(credentials))
            .await
    }

    async fn register(&self, profile: &RegisterProfile) -> Result<AuthResponse, AuthError> {
        self.execute(Call::Register, self.post(Call::Register).json(profile))
            .await
    }

    async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        let body: TokenResponse = self
            .execute(Call::Refresh, self.post(Call::Refresh).bearer_auth(token))
            .await?;
        Ok(body.token)
    }

    async fn current_user(&self, token: &str) -> Result<User, AuthError> {
        let request = self
            .http
            .get(self.config.endpoint(Call::Me.path()))
            .bearer_auth(token);
        let body: UserEnvelope = self.execute(Call::Me, request).await?;
        Ok(body.user)
    }

    async fn update_profile(&self, token: &str, patch: &ProfileUpdate) -> Result<User, AuthError> {
        let request = self
            .http
            .put(self.config.endpoint(Call::UpdateProfile.path()))
            .bearer_auth(token)
            .json(patch);
        let body: UserEnvelope = self.execute(Call::UpdateProfile, request).await?;
        Ok(body.user)
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
