//! Role-based redirect policy.
//!
//! SYSTEM CONTEXT
//! ==============
//! Login, register and the route guard all send users to the same place for a
//! given role and onboarding status. Every call site goes through
//! [`destination_for`] so the table lives in exactly one spot.

use crate::types::{Role, User};

/// Public landing page.
pub const LANDING: &str = "/";
/// Sign-in page; target of logout and of failed guard checks.
pub const LOGIN: &str = "/login";
/// Sign-up page.
pub const REGISTER: &str = "/register";

/// Dashboard route for a role.
#[must_use]
pub fn dashboard_for(role: Role) -> &'static str {
    match role {
        Role::Employee => "/employee/dashboard",
        Role::Employer => "/employer/dashboard",
        Role::Admin => "/admin/dashboard",
    }
}

/// Onboarding route for a role. Admins have no onboarding flow.
#[must_use]
pub fn onboarding_for(role: Role) -> Option<&'static str> {
    match role {
        Role::Employee => Some("/employee/onboarding"),
        Role::Employer => Some("/employer/onboarding"),
        Role::Admin => None,
    }
}

/// Where `user` belongs after login, register, or a role mismatch.
#[must_use]
pub fn destination_for(user: &User) -> &'static str {
    if !user.onboarding_completed {
        if let Some(route) = onboarding_for(user.role) {
            return route;
        }
    }
    dashboard_for(user.role)
}

/// Whether `path` is inside an onboarding flow.
#[must_use]
pub fn is_onboarding_path(path: &str) -> bool {
    route_path(path).split('/').any(|segment| segment == "onboarding")
}

/// Redirect for guest-only pages (sign-in, sign-up) visited while signed in.
#[must_use]
pub fn guest_redirect(user: Option<&User>, path: &str) -> Option<&'static str> {
    let user = user?;
    let path = route_path(path);
    (path == LOGIN || path == REGISTER).then(|| destination_for(user))
}

/// Strip query, fragment and trailing slash from a route path.
fn route_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { LANDING } else { trimmed }
}

#[cfg(test)]
#[path = "redirect_test.rs"]
mod tests;
