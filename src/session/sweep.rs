//! Background token refresh sweep.
//!
//! DESIGN
//! ======
//! One tokio task per manager ticks on `refresh_interval` and refreshes the
//! token once it is inside the expiry leeway. The task holds only a `Weak`
//! handle, so it ends on its own when the last manager clone is dropped, and
//! it is aborted on logout or a failed auth check.
//!
//! ERROR HANDLING
//! ==============
//! Refresh failures are logged and retried on the next tick. They never clear
//! the session; only `check_auth` does that.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{SessionManager, Shared};
use crate::token;

/// Result of one proactive refresh attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No session to refresh.
    SignedOut,
    /// Token is outside the leeway window; nothing to do.
    StillValid,
    Refreshed,
    /// Backend or storage failure; the old token is kept.
    Failed,
}

pub(super) fn spawn(shared: Weak<Shared>, interval: Duration) -> JoinHandle<()> {
    debug!(interval_secs = interval.as_secs(), "token refresh sweep started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                debug!("session dropped; token refresh sweep exiting");
                break;
            };
            let outcome = SessionManager { shared }.refresh_if_due().await;
            debug!(?outcome, "token refresh sweep tick");
        }
    })
}

impl SessionManager {
    /// Refresh the token if it expires within the configured leeway.
    ///
    /// Used by the background sweep; hosts may also call it (e.g. when the
    /// window regains focus). Failures never clear the session.
    pub async fn refresh_if_due(&self) -> RefreshOutcome {
        let mut session = self.shared.session.lock().await;
        if !session.is_complete() {
            return RefreshOutcome::SignedOut;
        }
        let Some(current) = session.token.clone() else {
            return RefreshOutcome::SignedOut;
        };
        if !token::is_expired(&current, self.shared.config.leeway_secs()) {
            return RefreshOutcome::StillValid;
        }

        let fresh = match self.shared.backend.refresh(&current).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "background token refresh failed");
                return RefreshOutcome::Failed;
            }
        };
        if token::is_expired(&fresh, 0) {
            warn!("backend refresh returned an expired token; keeping the current one");
            return RefreshOutcome::Failed;
        }
        if let Err(e) = self.shared.store.save_token(&fresh) {
            warn!(error = %e, "failed to persist refreshed token");
            return RefreshOutcome::Failed;
        }
        session.token = Some(fresh);
        debug!("token refreshed in background");
        RefreshOutcome::Refreshed
    }
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;
