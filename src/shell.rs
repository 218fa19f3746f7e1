//! UI shell collaborators: router, toast surface, live connections.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session manager decides where to go and what to tell the user; the
//! host application decides how. These traits are the only way session code
//! reaches the UI.

/// Client-side router.
pub trait Navigator: Send + Sync {
    /// Replace the current route with `path`.
    fn navigate(&self, path: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible toast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Toast/notification surface.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that only logs; for headless hosts.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(message = %notice.message, "notice"),
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "notice"),
        }
    }
}

/// A live streaming connection (websocket, SSE) owned by another component
/// that must be closed when the user logs out.
pub trait LiveConnection: Send + Sync {
    fn disconnect(&self);
}

/// Recording doubles for tests and demos.
#[cfg(any(test, feature = "test-doubles"))]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// Records every navigation.
    #[derive(Debug, Default)]
    pub struct RecordingNavigator {
        paths: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        #[must_use]
        pub fn paths(&self) -> Vec<String> {
            self.paths.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        #[must_use]
        pub fn last(&self) -> Option<String> {
            self.paths().pop()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.paths
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.to_owned());
        }
    }

    /// Records every notice.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        #[must_use]
        pub fn notices(&self) -> Vec<Notice> {
            self.notices.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        #[must_use]
        pub fn errors(&self) -> Vec<Notice> {
            self.notices()
                .into_iter()
                .filter(|n| n.level == NoticeLevel::Error)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(notice);
        }
    }

    /// Counts disconnect calls.
    #[derive(Debug, Default)]
    pub struct RecordingConnection {
        disconnects: AtomicUsize,
    }

    impl RecordingConnection {
        #[must_use]
        pub fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    impl LiveConnection for RecordingConnection {
        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
