//! Session domain types shared with the auth backend.
//!
//! DESIGN
//! ======
//! `User` mirrors the backend's JSON user record (camelCase keys). Role-specific
//! profile attributes are opaque here and ride along in `extra` so a merge or a
//! storage round-trip never drops fields this layer does not know about.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that `update_user` may never overwrite.
pub const IMMUTABLE_USER_FIELDS: [&str; 2] = ["id", "role"];

/// Partial profile attributes for a profile update (shallow-merged).
pub type ProfileUpdate = Map<String, Value>;

// =============================================================================
// ROLE
// =============================================================================

/// Marketplace role, fixed for the lifetime of a user record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Job seeker.
    Employee,
    /// Hiring company account.
    Employer,
    /// Marketplace operator.
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Employer => "employer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// USER
// =============================================================================

/// The authenticated principal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique, immutable user identifier.
    pub id: String,
    pub email: String,
    /// Display name; empty when the backend omits it.
    #[serde(default)]
    pub name: String,
    /// Immutable after creation.
    pub role: Role,
    /// Set once the role's onboarding flow finishes.
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub profile_completed: bool,
    /// Role-specific profile attributes (skills, company name, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Shallow-merge `patch` into a copy of this user.
    ///
    /// `id` and `role` keys in the patch are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a patched value has the wrong shape for a typed
    /// field (e.g. a string for `onboardingCompleted`).
    pub fn merged(&self, patch: &ProfileUpdate) -> Result<Self, serde_json::Error> {
        let Value::Object(mut fields) = serde_json::to_value(self)? else {
            return Ok(self.clone());
        };
        for (key, value) in patch {
            if IMMUTABLE_USER_FIELDS.contains(&key.as_str()) {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(fields))
    }

    /// Serialize this user as a profile patch, without the immutable keys.
    #[must_use]
    pub fn to_patch(&self) -> ProfileUpdate {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => strip_immutable(&fields),
            _ => ProfileUpdate::new(),
        }
    }
}

/// Copy of `patch` without `id` or `role`.
#[must_use]
pub fn strip_immutable(patch: &ProfileUpdate) -> ProfileUpdate {
    patch
        .iter()
        .filter(|(key, _)| !IMMUTABLE_USER_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// =============================================================================
// REQUEST PAYLOADS
// =============================================================================

/// Sign-up form payload for `POST /auth/register`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProfile {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for RegisterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterProfile")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Login form payload for `POST /auth/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// RESPONSE PAYLOADS
// =============================================================================

/// `{user, token}` returned by login and register.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// `{token}` returned by refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// `{user}` returned by `/auth/me` and profile updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: User,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
