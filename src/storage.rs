//! Persistent client storage for the session.
//!
//! DESIGN
//! ======
//! `SessionStorage` is a string key/value store with the shape of browser
//! `localStorage`. `SessionStore` layers the session layout on top of it:
//! `{namespace}.token` holds the bearer token and `{namespace}.user` holds the
//! user record as JSON.
//!
//! ERROR HANDLING
//! ==============
//! A save that fails half-way removes what it already wrote, so storage never
//! holds a token without a user (or the reverse) after a completed call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::types::User;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Key/value storage that survives application restarts.
pub trait SessionStorage: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY STORAGE
// =============================================================================

/// Process-local storage. Survives a simulated reload when the same instance is
/// handed to a new `SessionManager`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORAGE
// =============================================================================

/// All keys in one JSON object file, rewritten atomically (temp file + rename).
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Build from `SESSION_STORAGE_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("SESSION_STORAGE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing { var: "SESSION_STORAGE_PATH".into() })?;
        Ok(Self::new(path.trim()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(entries).map_err(|e| StorageError::Io(e.to_string()))?;
        let tmp = self.path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        std::fs::write(&tmp, body).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            StorageError::Io(e.to_string())
        })
    }

    fn modify(&self, apply: impl FnOnce(&mut HashMap<String, String>) -> bool) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        if apply(&mut entries) {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|entries| entries.remove(key).is_some())
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// A complete persisted session.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub token: String,
    pub user: User,
}

/// What hydration found in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredSession {
    Empty,
    Complete(PersistedSession),
    /// Only one of token/user was present, or the user record did not parse.
    Invalid,
}

/// Typed view of the session keys inside a [`SessionStorage`].
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    token_key: String,
    user_key: String,
}

impl SessionStore {
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, namespace: &str) -> Self {
        Self { storage, token_key: format!("{namespace}.token"), user_key: format!("{namespace}.user") }
    }

    #[must_use]
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    #[must_use]
    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Read the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub fn load(&self) -> Result<StoredSession, StorageError> {
        let token = self.storage.get(&self.token_key)?;
        let user = self.storage.get(&self.user_key)?;
        Ok(match (token, user) {
            (None, None) => StoredSession::Empty,
            (Some(token), Some(raw_user)) => match serde_json::from_str::<User>(&raw_user) {
                Ok(user) if !token.is_empty() => StoredSession::Complete(PersistedSession { token, user }),
                Ok(_) => StoredSession::Invalid,
                Err(e) => {
                    warn!(error = %e, "persisted user record is corrupt");
                    StoredSession::Invalid
                }
            },
            _ => StoredSession::Invalid,
        })
    }

    /// Read just the persisted token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub fn load_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.storage.get(&self.token_key)?.filter(|t| !t.is_empty()))
    }

    /// Read just the persisted user record, if it parses.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub fn load_user(&self) -> Result<Option<User>, StorageError> {
        let Some(raw) = self.storage.get(&self.user_key)? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Persist token and user together.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails; the keys are then removed.
    pub fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let user = serde_json::to_string(&session.user).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let result = self
            .storage
            .set(&self.token_key, &session.token)
            .and_then(|()| self.storage.set(&self.user_key, &user));
        if result.is_err() {
            let _ = self.clear();
        }
        result
    }

    /// Replace only the persisted token (after a refresh).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(&self.token_key, token)
    }

    /// Replace only the persisted user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_user(&self, user: &User) -> Result<(), StorageError> {
        let raw = serde_json::to_string(user).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.storage.set(&self.user_key, &raw)
    }

    /// Remove both keys. Both removals are attempted even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first removal error.
    pub fn clear(&self) -> Result<(), StorageError> {
        let token = self.storage.remove(&self.token_key);
        let user = self.storage.remove(&self.user_key);
        token.and(user)
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
