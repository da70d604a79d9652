//! Account registry integration tests
//!
//! Exercises registration, login and owner-only lookup against the
//! in-memory stores:
//! - Validation and uniqueness conflicts
//! - Identical errors for unknown users and wrong passwords
//! - Sanitized account views
//! - Welcome email submission

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tallyho::accounts::{
    AccountRegistry, NewAccount, RegisterRequest, StoredAccount, INVALID_CREDENTIALS,
};
use tallyho::auth::{CredentialStore, HashCost, Policies, TokenExpiry, TokenService};
use tallyho::clock::ManualClock;
use tallyho::db::{AccountFilter, AccountStore, HiddenFields, InMemoryAccountStore, StoreError};
use tallyho::notify::{EmailMessage, NotificationQueue, NotifyError, Notifier, WelcomeTemplate};
use tallyho::types::{AccountId, InteractionKind, ResourceId, TallyError, UniqueField};

const NOW: u64 = 1_700_000_000;
const PASSWORD: &str = "hunter22";

// =============================================================================
// Fixtures
// =============================================================================

fn welcome() -> WelcomeTemplate {
    WelcomeTemplate {
        sender_domain: "tallyho.test".into(),
        display_name: "Tallyho".into(),
        product_name: "Tallyho".into(),
        frontend_url: "https://tallyho.test".into(),
    }
}

fn registry_with(accounts: Arc<dyn AccountStore>, notifications: NotificationQueue) -> AccountRegistry {
    let credentials = CredentialStore::new(HashCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap();

    AccountRegistry::new(
        accounts,
        credentials,
        TokenService::new_dev(TokenExpiry::default()),
        Policies::default(),
        welcome(),
        notifications,
    )
    .with_clock(Arc::new(ManualClock::new(NOW)))
}

fn registry(store: Arc<InMemoryAccountStore>) -> AccountRegistry {
    registry_with(store, NotificationQueue::disabled())
}

fn request(username: &str, email: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        username: username.into(),
        email: email.map(Into::into),
        password: PASSWORD.into(),
        password_confirmation: PASSWORD.into(),
    }
}

/// Keeps every message it is asked to send
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Rejects everything
struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _message: &EmailMessage) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("connection refused".into()))
    }
}

/// Never sees existing accounts, so the availability check always passes
/// and only the store's uniqueness rule can stop a duplicate
struct BlindAccountStore {
    inner: InMemoryAccountStore,
}

#[async_trait]
impl AccountStore for BlindAccountStore {
    async fn find_one(
        &self,
        _filter: &AccountFilter,
        _hidden: HiddenFields,
    ) -> Result<Option<StoredAccount>, StoreError> {
        Ok(None)
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<StoredAccount>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn create(&self, account: NewAccount) -> Result<StoredAccount, StoreError> {
        self.inner.create(account).await
    }

    async fn add_to_set(
        &self,
        id: &AccountId,
        kind: InteractionKind,
        resource: &ResourceId,
    ) -> Result<bool, StoreError> {
        self.inner.add_to_set(id, kind, resource).await
    }
}

/// Store whose backend is down
struct UnavailableAccountStore;

#[async_trait]
impl AccountStore for UnavailableAccountStore {
    async fn find_one(
        &self,
        _filter: &AccountFilter,
        _hidden: HiddenFields,
    ) -> Result<Option<StoredAccount>, StoreError> {
        Err(StoreError::Backend("server selection timeout".into()))
    }

    async fn find_by_id(&self, _id: &AccountId) -> Result<Option<StoredAccount>, StoreError> {
        Err(StoreError::Backend("server selection timeout".into()))
    }

    async fn create(&self, _account: NewAccount) -> Result<StoredAccount, StoreError> {
        Err(StoreError::Backend("server selection timeout".into()))
    }

    async fn add_to_set(
        &self,
        _id: &AccountId,
        _kind: InteractionKind,
        _resource: &ResourceId,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Backend("server selection timeout".into()))
    }
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_password_mismatch_persists_nothing() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store.clone());

    let mut req = request("alice", Some("alice@example.com"));
    req.password_confirmation = "hunter23".into();

    let err = registry.register(req).await.unwrap_err();
    assert!(matches!(err, TallyError::Validation(ref m) if m == "password mismatch"));
    assert!(store.is_empty().await, "No account should be persisted");
}

#[tokio::test]
async fn test_register_returns_token_and_sanitized_account() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store);

    let session = registry
        .register(request("alice", Some("Alice@Example.com")))
        .await
        .unwrap();

    let claims = registry.authenticate(&session.token).unwrap();
    assert_eq!(claims.sub, session.account.id.as_str());
    assert_eq!(claims.username, "alice");

    assert_eq!(session.account.username.as_str(), "alice");
    assert_eq!(session.account.email.as_ref().unwrap().as_str(), "alice@example.com");
    assert!(session.account.likes.is_empty());
    assert!(session.account.strikes.is_empty());

    let json = serde_json::to_value(&session).unwrap();
    let account = json["account"].as_object().unwrap();
    assert!(!account.contains_key("password_hash"));
    assert!(!json.to_string().contains("$argon2"), "Serialized session must not carry a hash");
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store.clone());

    registry.register(request("alice", None)).await.unwrap();
    let err = registry.register(request("alice", None)).await.unwrap_err();

    assert!(matches!(err, TallyError::Conflict(UniqueField::Username)));
    assert_eq!(err.to_string(), "Conflict: username taken");
    assert_eq!(err.code(), "USERNAME_TAKEN");
    assert_eq!(store.count_username("alice").await, 1);
}

#[tokio::test]
async fn test_usernames_differing_in_case_are_distinct() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store.clone());

    let upper = registry.register(request("Alice", None)).await.unwrap();
    let lower = registry.register(request("alice", None)).await.unwrap();
    assert_ne!(upper.account.id, lower.account.id);
    assert_eq!(store.len().await, 2);

    let session = registry.login("Alice", PASSWORD).await.unwrap();
    assert_eq!(session.account.id, upper.account.id);
}

#[tokio::test]
async fn test_reused_email_conflicts_on_email() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store.clone());

    registry
        .register(request("alice", Some("shared@example.com")))
        .await
        .unwrap();
    let err = registry
        .register(request("bob", Some("SHARED@example.com")))
        .await
        .unwrap_err();

    assert!(matches!(err, TallyError::Conflict(UniqueField::Email)));
    assert_eq!(err.code(), "EMAIL_TAKEN");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_accounts_without_email_do_not_collide() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store.clone());

    registry.register(request("alice", None)).await.unwrap();
    registry.register(request("bob", None)).await.unwrap();

    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_lost_uniqueness_race_is_conflict() {
    let store = Arc::new(BlindAccountStore {
        inner: InMemoryAccountStore::new(),
    });
    let registry = registry_with(store.clone(), NotificationQueue::disabled());

    registry.register(request("alice", None)).await.unwrap();
    let err = registry.register(request("alice", None)).await.unwrap_err();

    assert!(matches!(err, TallyError::Conflict(UniqueField::Username)));
    assert_eq!(store.inner.count_username("alice").await, 1);
}

#[tokio::test]
async fn test_concurrent_registrations_create_one_account() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = Arc::new(registry(store.clone()));

    let (first, second) = tokio::join!(
        registry.register(request("alice", None)),
        registry.register(request("alice", None)),
    );

    assert!(first.is_ok() ^ second.is_ok(), "Exactly one registration should win");
    let err = first.err().or(second.err()).unwrap();
    assert!(matches!(err, TallyError::Conflict(UniqueField::Username)));
    assert_eq!(store.count_username("alice").await, 1);
}

#[tokio::test]
async fn test_store_outage_is_server_error() {
    let registry = registry_with(Arc::new(UnavailableAccountStore), NotificationQueue::disabled());

    let err = registry.register(request("alice", None)).await.unwrap_err();
    assert!(matches!(err, TallyError::Server(_)));
    assert!(err.is_retryable());

    let err = registry.login("alice", PASSWORD).await.unwrap_err();
    assert!(matches!(err, TallyError::Server(_)), "Outage must not look like bad credentials");
}

// =============================================================================
// Welcome email
// =============================================================================

#[tokio::test]
async fn test_welcome_email_sent_only_with_email() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (queue, delivery) = NotificationQueue::spawn(notifier.clone(), 8);
    let registry = registry_with(Arc::new(InMemoryAccountStore::new()), queue);

    registry
        .register(request("alice", Some("alice@example.com")))
        .await
        .unwrap();
    registry.register(request("bob", None)).await.unwrap();

    // Closing the queue lets the delivery task drain and finish
    drop(registry);
    delivery.await.unwrap();

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert_eq!(sent[0].from, "Tallyho <welcome@tallyho.test>");
    assert_eq!(sent[0].subject, "Welcome To Tallyho!");
    assert!(sent[0].body.contains("alice"));
    assert!(sent[0].body.contains("https://tallyho.test"));
}

#[tokio::test]
async fn test_failing_notifier_does_not_fail_registration() {
    let (queue, delivery) = NotificationQueue::spawn(Arc::new(FailingNotifier), 8);
    let registry = registry_with(Arc::new(InMemoryAccountStore::new()), queue);

    let session = registry
        .register(request("alice", Some("alice@example.com")))
        .await;
    assert!(session.is_ok());

    drop(registry);
    delivery.await.unwrap();
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_succeeds_with_correct_password() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store);

    let registered = registry
        .register(request("alice", Some("alice@example.com")))
        .await
        .unwrap();
    let session = registry.login("alice", PASSWORD).await.unwrap();

    assert_eq!(session.account.id, registered.account.id);
    let claims = registry.authenticate(&session.token).unwrap();
    assert_eq!(claims.sub, registered.account.id.as_str());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store);
    registry.register(request("alice", None)).await.unwrap();

    let wrong_password = registry.login("alice", "hunter23").await.unwrap_err();
    let unknown_user = registry.login("mallory", PASSWORD).await.unwrap_err();

    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    assert_eq!(wrong_password.code(), unknown_user.code());
    assert!(matches!(wrong_password, TallyError::Auth(ref m) if m == INVALID_CREDENTIALS));
}

// =============================================================================
// Owner-only lookup
// =============================================================================

#[tokio::test]
async fn test_get_one_auth_refuses_other_accounts() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store);

    let alice = registry.register(request("alice", None)).await.unwrap().account;
    let bob = registry.register(request("bob", None)).await.unwrap().account;
    let ghost = AccountId::new("does-not-exist").unwrap();

    let existing = registry.get_one_auth(&alice.id, &bob.id).await.unwrap_err();
    let missing = registry.get_one_auth(&alice.id, &ghost).await.unwrap_err();

    assert!(matches!(existing, TallyError::Forbidden(_)));
    assert!(matches!(missing, TallyError::Forbidden(_)));
    assert_eq!(existing.to_string(), missing.to_string());
}

#[tokio::test]
async fn test_get_one_auth_forbidden_before_store_access() {
    let registry = registry_with(Arc::new(UnavailableAccountStore), NotificationQueue::disabled());
    let alice = AccountId::new("alice-id").unwrap();
    let bob = AccountId::new("bob-id").unwrap();

    let err = registry.get_one_auth(&alice, &bob).await.unwrap_err();
    assert!(matches!(err, TallyError::Forbidden(_)));
}

#[tokio::test]
async fn test_get_one_auth_returns_own_account() {
    let store = Arc::new(InMemoryAccountStore::new());
    let registry = registry(store);

    let alice = registry.register(request("alice", None)).await.unwrap().account;
    let fetched = registry.get_one_auth(&alice.id, &alice.id).await.unwrap();

    assert_eq!(fetched.id, alice.id);
    assert_eq!(fetched.username, alice.username);
}
