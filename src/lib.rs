//! Client-side session manager for the job marketplace.
//!
//! SYSTEM CONTEXT
//! ==============
//! Pages never talk to the auth backend directly. They hold a cloned
//! [`SessionManager`] (login, register, logout, profile updates) and wrap
//! protected subtrees in a [`RouteGuard`], which asks the manager whether the
//! current credential is still valid before anything renders.
//!
//! Collaborators are injected as trait objects: the REST backend
//! ([`backend::AuthBackend`]), persistent storage ([`storage::SessionStorage`]),
//! and the UI shell ([`shell::Navigator`], [`shell::Notifier`],
//! [`shell::LiveConnection`]).

pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod redirect;
pub mod session;
pub mod shell;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{ApiConfig, SessionConfig};
pub use error::{AuthError, AuthErrorKind};
pub use guard::{GuardState, MountHandle, RouteGuard};
pub use redirect::destination_for;
pub use session::{Collaborators, SessionManager, SessionStatus};
pub use types::{ProfileUpdate, RegisterProfile, Role, User};
