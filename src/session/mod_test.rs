use super::*;
use crate::backend::mock::{DEMO_PASSWORD, MockBackend};
use crate::shell::NoticeLevel;
use crate::shell::testing::{RecordingConnection, RecordingNavigator, RecordingNotifier};
use crate::storage::{MemoryStorage, StorageError};
use serde_json::json;

const TOKEN_KEY: &str = "jobmarket.session.token";
const USER_KEY: &str = "jobmarket.session.user";

struct Harness {
    manager: SessionManager,
    backend: Arc<MockBackend>,
    storage: Arc<MemoryStorage>,
    navigator: Arc<RecordingNavigator>,
    notifier: Arc<RecordingNotifier>,
}

fn harness_with(backend: Arc<MockBackend>, storage: Arc<MemoryStorage>) -> Harness {
    let navigator = Arc::new(RecordingNavigator::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let manager = SessionManager::new(
        SessionConfig::default(),
        Collaborators {
            backend: backend.clone(),
            storage: storage.clone(),
            navigator: navigator.clone(),
            notifier: notifier.clone(),
        },
    );
    Harness { manager, backend, storage, navigator, notifier }
}

async fn started() -> Harness {
    let h = harness_with(Arc::new(MockBackend::with_demo_accounts()), Arc::new(MemoryStorage::new()));
    h.manager.start().await;
    h
}

fn stored(h: &Harness, key: &str) -> Option<String> {
    h.storage.get(key).unwrap()
}

// =============================================================================
// start / hydration
// =============================================================================

#[tokio::test]
async fn new_manager_is_loading_until_started() {
    let h = harness_with(Arc::new(MockBackend::new()), Arc::new(MemoryStorage::new()));
    assert_eq!(h.manager.status(), SessionStatus { loading: true, authenticated: false });
    h.manager.start().await;
    assert_eq!(h.manager.status(), SessionStatus { loading: false, authenticated: false });
}

#[tokio::test]
async fn subscribers_see_hydration_finish() {
    let h = harness_with(Arc::new(MockBackend::new()), Arc::new(MemoryStorage::new()));
    let mut rx = h.manager.subscribe();
    assert!(rx.borrow().loading);
    h.manager.start().await;
    assert!(rx.has_changed().unwrap());
    assert!(!rx.borrow_and_update().loading);
}

#[tokio::test]
async fn reload_restores_same_user_and_role() {
    let storage = Arc::new(MemoryStorage::new());
    let backend = Arc::new(MockBackend::with_demo_accounts());
    let first = harness_with(backend.clone(), storage.clone());
    first.manager.start().await;
    let user = first.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    first.manager.shutdown();

    let reloaded = harness_with(backend, storage);
    reloaded.manager.start().await;
    let restored = reloaded.manager.current_user().await.unwrap();
    assert_eq!(restored.id, user.id);
    assert_eq!(restored.role, user.role);
    assert!(reloaded.manager.is_authenticated());
    assert!(reloaded.manager.sweep_running());
}

#[tokio::test]
async fn start_discards_token_without_user() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "orphan").unwrap();
    let h = harness_with(Arc::new(MockBackend::new()), storage);
    h.manager.start().await;
    assert!(!h.manager.is_authenticated());
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn start_discards_corrupt_user_record() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "tok").unwrap();
    storage.set(USER_KEY, "{\"role\":\"pirate\"}").unwrap();
    let h = harness_with(Arc::new(MockBackend::new()), storage);
    h.manager.start().await;
    assert!(!h.manager.is_authenticated());
    assert!(h.storage.is_empty());
}

// =============================================================================
// login
// =============================================================================

#[tokio::test]
async fn employee_login_redirects_to_onboarding() {
    let h = started().await;
    let user = h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap();
    assert_eq!(user.role, Role::Employee);
    assert!(!user.onboarding_completed);
    assert_eq!(h.navigator.last().as_deref(), Some("/employee/onboarding"));
    assert!(h.manager.is_authenticated());
    assert!(h.manager.sweep_running());
}

#[tokio::test]
async fn login_persists_token_and_user() {
    let h = started().await;
    let user = h.manager.login("  admin@example.com ", DEMO_PASSWORD).await.unwrap();
    assert_eq!(h.navigator.last().as_deref(), Some("/admin/dashboard"));
    assert_eq!(stored(&h, TOKEN_KEY), h.manager.token().await);
    let persisted: User = serde_json::from_str(&stored(&h, USER_KEY).unwrap()).unwrap();
    assert_eq!(persisted, user);
    assert_eq!(h.notifier.notices().last().map(|n| n.level), Some(NoticeLevel::Success));
}

#[tokio::test]
async fn wrong_password_leaves_session_untouched() {
    let h = started().await;
    let err = h.manager.login("employee@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), crate::AuthErrorKind::InvalidCredentials);
    assert!(!h.manager.is_authenticated());
    assert!(h.storage.is_empty());
    assert!(h.navigator.paths().is_empty());
    assert_eq!(h.notifier.errors().len(), 1);
    assert_eq!(h.notifier.errors()[0].message, "Invalid email or password.");
}

#[tokio::test]
async fn failed_login_keeps_previous_session() {
    let h = started().await;
    let employer = h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    let token = h.manager.token().await;
    h.manager.login("employee@example.com", "wrong").await.unwrap_err();
    assert_eq!(h.manager.current_user().await.unwrap().id, employer.id);
    assert_eq!(h.manager.token().await, token);
    assert_eq!(stored(&h, TOKEN_KEY), token);
}

#[tokio::test]
async fn empty_credentials_never_reach_backend() {
    let h = started().await;
    let err = h.manager.login("   ", "").await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
    assert_eq!(h.backend.login_calls(), 0);
    assert_eq!(h.notifier.errors().len(), 1);
}

#[tokio::test]
async fn network_failure_on_login_is_surfaced() {
    let h = started().await;
    h.backend.set_fail_network(true);
    let err = h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap_err();
    assert_eq!(err.kind(), crate::AuthErrorKind::NetworkError);
    assert!(h.storage.is_empty());
    assert!(h.notifier.errors()[0].message.contains("Unable to reach the server"));
}

// =============================================================================
// register
// =============================================================================

fn profile(email: &str, role: Role) -> RegisterProfile {
    RegisterProfile { name: "New Person".into(), email: email.into(), password: "s3cret-pass".into(), role }
}

#[tokio::test]
async fn register_redirects_to_role_onboarding() {
    let h = started().await;
    let user = h.manager.register(profile("hr@acme.test", Role::Employer)).await.unwrap();
    assert_eq!(user.role, Role::Employer);
    assert!(!user.onboarding_completed);
    assert_eq!(h.navigator.last().as_deref(), Some("/employer/onboarding"));
    assert!(stored(&h, TOKEN_KEY).is_some());
}

#[tokio::test]
async fn register_rejects_admin_self_signup() {
    let h = started().await;
    let err = h.manager.register(profile("boss@acme.test", Role::Admin)).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
    assert!(h.backend.account("boss@acme.test").is_none());
    assert!(!h.manager.is_authenticated());
}

#[tokio::test]
async fn register_duplicate_email_shows_backend_reason() {
    let h = started().await;
    let err = h.manager.register(profile("employee@example.com", Role::Employee)).await.unwrap_err();
    assert_eq!(err.kind(), crate::AuthErrorKind::ValidationError);
    assert_eq!(h.notifier.errors()[0].message, "Email already registered");
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn register_requires_all_fields() {
    let h = started().await;
    let mut incomplete = profile("x@y.z", Role::Employee);
    incomplete.name = "  ".into();
    assert!(matches!(h.manager.register(incomplete).await, Err(AuthError::Validation(_))));
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn login_then_logout_clears_everything() {
    for email in ["employee@example.com", "employer@example.com", "admin@example.com"] {
        let h = started().await;
        h.manager.login(email, DEMO_PASSWORD).await.unwrap();
        h.manager.logout().await;
        assert!(h.storage.is_empty());
        assert!(!h.manager.is_authenticated());
        assert!(!h.manager.sweep_running());
        assert!(!h.manager.check_auth().await);
        assert!(h.storage.is_empty());
    }
}

#[tokio::test]
async fn logout_redirects_and_disconnects_once() {
    let h = started().await;
    let connection = Arc::new(RecordingConnection::default());
    h.manager.attach_connection(connection.clone());
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();

    h.manager.logout().await;
    assert_eq!(h.navigator.last().as_deref(), Some("/login"));
    assert_eq!(connection.disconnects(), 1);

    let navigations = h.navigator.paths().len();
    h.manager.logout().await;
    assert_eq!(h.navigator.paths().len(), navigations);
    assert_eq!(connection.disconnects(), 1);
}

#[tokio::test]
async fn logout_shows_no_notice() {
    let h = started().await;
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    let before = h.notifier.notices().len();
    h.manager.logout().await;
    assert_eq!(h.notifier.notices().len(), before);
}

#[tokio::test]
async fn forced_sign_out_closes_live_connections() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    let connection = Arc::new(RecordingConnection::default());
    h.manager.attach_connection(connection.clone());
    h.backend.set_fail_refresh(true);

    assert!(!h.manager.check_auth().await);
    assert_eq!(connection.disconnects(), 1);

    h.manager.logout().await;
    h.backend.set_fail_refresh(false);
    h.backend.set_token_ttl_secs(3600);
    h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap();
    h.manager.logout().await;
    assert_eq!(connection.disconnects(), 1);
}

#[tokio::test]
async fn logout_without_session_still_closes_leftover_connections() {
    let h = started().await;
    let connection = Arc::new(RecordingConnection::default());
    h.manager.attach_connection(connection.clone());
    h.manager.logout().await;
    assert_eq!(connection.disconnects(), 1);
    assert!(h.navigator.paths().is_empty());
}

#[tokio::test]
async fn signing_in_as_someone_else_closes_previous_connections() {
    let h = started().await;
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    let connection = Arc::new(RecordingConnection::default());
    h.manager.attach_connection(connection.clone());

    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    assert_eq!(connection.disconnects(), 0);

    h.manager.login("admin@example.com", DEMO_PASSWORD).await.unwrap();
    assert_eq!(connection.disconnects(), 1);
}

// =============================================================================
// update_user
// =============================================================================

#[tokio::test]
async fn update_without_session_is_not_authenticated() {
    let h = started().await;
    let err = h.manager.update_user(ProfileUpdate::new()).await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn update_merges_but_never_changes_id_or_role() {
    let h = started().await;
    let before = h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap();

    let mut patch = ProfileUpdate::new();
    patch.insert("id".into(), json!("hijack"));
    patch.insert("role".into(), json!("admin"));
    patch.insert("onboardingCompleted".into(), json!(true));
    patch.insert("skills".into(), json!(["rust"]));
    let after = h.manager.update_user(patch).await.unwrap();

    assert_eq!(after.id, before.id);
    assert_eq!(after.role, Role::Employee);
    assert!(after.onboarding_completed);
    assert_eq!(after.extra.get("skills"), Some(&json!(["rust"])));

    let persisted: User = serde_json::from_str(&stored(&h, USER_KEY).unwrap()).unwrap();
    assert_eq!(persisted, after);
    let account = h.backend.account("employee@example.com").unwrap();
    assert_eq!(account.role, Role::Employee);
    assert!(account.onboarding_completed);
}

#[tokio::test]
async fn malformed_update_is_rejected_locally() {
    let h = started().await;
    let before = h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap();
    let mut patch = ProfileUpdate::new();
    patch.insert("profileCompleted".into(), json!("definitely"));
    let err = h.manager.update_user(patch).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
    assert_eq!(h.backend.update_calls(), 0);
    assert_eq!(h.manager.current_user().await.unwrap(), before);
}

#[tokio::test]
async fn failed_update_leaves_user_unchanged() {
    let h = started().await;
    let before = h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    h.backend.set_fail_network(true);
    let mut patch = ProfileUpdate::new();
    patch.insert("companyName".into(), json!("Acme"));
    assert!(h.manager.update_user(patch).await.is_err());
    assert_eq!(h.manager.current_user().await.unwrap(), before);
    let persisted: User = serde_json::from_str(&stored(&h, USER_KEY).unwrap()).unwrap();
    assert_eq!(persisted, before);
}

// =============================================================================
// check_auth
// =============================================================================

#[tokio::test]
async fn check_auth_without_session_is_false() {
    let h = started().await;
    assert!(!h.manager.check_auth().await);
    assert_eq!(h.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn check_auth_with_valid_token_does_not_refresh() {
    let h = started().await;
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    assert!(h.manager.check_auth().await);
    assert_eq!(h.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_exactly_once() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    let stale = h.manager.token().await.unwrap();
    h.backend.set_token_ttl_secs(3600);

    assert!(h.manager.check_auth().await);
    assert_eq!(h.backend.refresh_calls(), 1);
    let fresh = h.manager.token().await.unwrap();
    assert_ne!(fresh, stale);
    assert!(!token::is_expired(&fresh, 0));
    assert_eq!(stored(&h, TOKEN_KEY).as_deref(), Some(fresh.as_str()));
    assert!(h.manager.is_authenticated());
}

#[tokio::test]
async fn failed_refresh_during_check_clears_silently() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    h.backend.set_fail_refresh(true);
    let notices = h.notifier.notices().len();
    let navigations = h.navigator.paths().len();

    assert!(!h.manager.check_auth().await);
    assert_eq!(h.backend.refresh_calls(), 1);
    assert!(h.storage.is_empty());
    assert!(!h.manager.is_authenticated());
    assert!(!h.manager.sweep_running());
    assert_eq!(h.notifier.notices().len(), notices);
    assert_eq!(h.navigator.paths().len(), navigations);
}

#[tokio::test]
async fn refresh_returning_expired_token_is_unrecoverable() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    assert!(!h.manager.check_auth().await);
    assert_eq!(h.backend.refresh_calls(), 1);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn check_auth_fetches_user_when_only_token_is_stored() {
    let backend = Arc::new(MockBackend::with_demo_accounts());
    let storage = Arc::new(MemoryStorage::new());
    let token = backend.issue_token_for("employee@example.com").unwrap();
    storage.set(TOKEN_KEY, &token).unwrap();
    let h = harness_with(backend, storage);

    assert!(h.manager.check_auth().await);
    assert_eq!(h.backend.me_calls(), 1);
    assert_eq!(h.manager.current_user().await.unwrap().id, "demo-employee");
    assert!(stored(&h, USER_KEY).is_some());
    assert!(h.manager.is_authenticated());
}

#[tokio::test]
async fn check_auth_with_unknown_token_clears() {
    let storage = Arc::new(MemoryStorage::new());
    let forged = token::unsigned_token("nobody", token::now_unix() + 3600, "x");
    storage.set(TOKEN_KEY, &forged).unwrap();
    let h = harness_with(Arc::new(MockBackend::with_demo_accounts()), storage);
    assert!(!h.manager.check_auth().await);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn concurrent_checks_and_sweep_refresh_once() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap();
    h.backend.set_token_ttl_secs(3600);
    h.backend.set_refresh_delay(std::time::Duration::from_millis(20));

    let (a, b, sweep) = tokio::join!(h.manager.check_auth(), h.manager.check_auth(), h.manager.refresh_if_due());
    assert!(a && b);
    assert!(matches!(sweep, RefreshOutcome::Refreshed | RefreshOutcome::StillValid));
    assert_eq!(h.backend.refresh_calls(), 1);

    let stored_token = stored(&h, TOKEN_KEY).unwrap();
    assert!(h.backend.issued_tokens().contains(&stored_token));
    assert_eq!(Some(stored_token), h.manager.token().await);
}

#[tokio::test]
async fn concurrent_checks_from_spawned_tasks_agree() {
    let h = started().await;
    h.backend.set_token_ttl_secs(-10);
    h.manager.login("employer@example.com", DEMO_PASSWORD).await.unwrap();
    h.backend.set_token_ttl_secs(3600);
    h.backend.set_refresh_delay(std::time::Duration::from_millis(10));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.check_auth().await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(h.backend.refresh_calls(), 1);
    assert_eq!(stored(&h, TOKEN_KEY), h.manager.token().await);
}

// =============================================================================
// storage failures
// =============================================================================

/// Storage whose writes can be switched off.
#[derive(Default)]
struct Switchable {
    inner: MemoryStorage,
    read_only: std::sync::atomic::AtomicBool,
}

impl SessionStorage for Switchable {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::Io("quota exceeded".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn unpersistable_login_fails_without_partial_state() {
    let storage = Arc::new(Switchable::default());
    storage.read_only.store(true, std::sync::atomic::Ordering::SeqCst);
    let navigator = Arc::new(RecordingNavigator::default());
    let manager = SessionManager::new(
        SessionConfig::default(),
        Collaborators {
            backend: Arc::new(MockBackend::with_demo_accounts()),
            storage: storage.clone(),
            navigator: navigator.clone(),
            notifier: Arc::new(RecordingNotifier::default()),
        },
    );
    manager.start().await;

    let err = manager.login("employee@example.com", DEMO_PASSWORD).await.unwrap_err();
    assert_eq!(err.kind(), crate::AuthErrorKind::StorageError);
    assert!(!manager.is_authenticated());
    assert!(manager.current_user().await.is_none());
    assert!(storage.inner.is_empty());
    assert!(navigator.paths().is_empty());
}
