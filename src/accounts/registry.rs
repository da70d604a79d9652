//! Registration, login and self-lookup
//!
//! Flow for `register`:
//! 1. Check password confirmation, password policy, username policy, email shape
//! 2. Look up an existing account by username or email (advisory)
//! 3. Hash the password with Argon2
//! 4. Create the account; the store's unique index has the final word
//! 5. Queue a welcome email when an email was given
//! 6. Issue a token and return the account without credential material

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::model::{Account, Email, NewAccount, Username};
use crate::auth::{Claims, CredentialStore, PasswordHash, Policies, TokenService};
use crate::clock::{Clock, SystemClock};
use crate::db::{AccountFilter, AccountStore, HiddenFields, StoreError};
use crate::notify::{NotificationQueue, WelcomeTemplate};
use crate::types::{AccountId, Result, TallyError, UniqueField};

/// Shared by every credential failure so callers cannot tell which factor
/// was wrong
pub const INVALID_CREDENTIALS: &str = "incorrect username or password";

fn invalid_credentials() -> TallyError {
    TallyError::Auth(INVALID_CREDENTIALS.into())
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

/// Result of a successful register or login
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub account: Account,
}

/// Orchestrates account creation and credential checks
pub struct AccountRegistry {
    accounts: Arc<dyn AccountStore>,
    credentials: CredentialStore,
    tokens: TokenService,
    policies: Policies,
    welcome: WelcomeTemplate,
    notifications: NotificationQueue,
    clock: Arc<dyn Clock>,
    /// Verified against when the username is unknown, so both login
    /// failures cost one hash verification
    decoy_hash: OnceCell<PasswordHash>,
}

impl AccountRegistry {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        credentials: CredentialStore,
        tokens: TokenService,
        policies: Policies,
        welcome: WelcomeTemplate,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            accounts,
            credentials,
            tokens,
            policies,
            welcome,
            notifications,
            clock: Arc::new(SystemClock),
            decoy_hash: OnceCell::new(),
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an account and sign the caller in
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthSession> {
        if request.password != request.password_confirmation {
            return Err(TallyError::Validation("password mismatch".into()));
        }

        if !self.policies.password.allows(&request.password) {
            return Err(TallyError::Validation("invalid password".into()));
        }

        let username = Username::parse(&request.username, &self.policies.username)?;
        let email = Email::parse_optional(request.email.as_deref())?;

        let filter = AccountFilter::for_registration(&username, email.as_ref());
        let existing = self
            .accounts
            .find_one(&filter, HiddenFields::EMAIL)
            .await
            .map_err(|e| {
                error!("Account lookup failed during registration: {}", e);
                TallyError::Server(format!("could not check account availability: {e}"))
            })?;

        if let Some(existing) = existing {
            let field = if existing.account.username == username {
                UniqueField::Username
            } else {
                UniqueField::Email
            };
            warn!("Registration rejected - {} taken (username: {})", field, username);
            return Err(TallyError::Conflict(field));
        }

        let password_hash = self.credentials.hash(&request.password).await?;

        let created = self
            .accounts
            .create(NewAccount {
                username,
                email,
                password_hash,
            })
            .await;

        let stored = match created {
            Ok(stored) => stored,
            Err(StoreError::Duplicate(Some(field))) => {
                warn!("Registration lost a uniqueness race on {}", field);
                return Err(TallyError::Conflict(field));
            }
            Err(e) => {
                error!("Failed to persist account: {}", e);
                return Err(TallyError::Server("could not persist account".into()));
            }
        };

        if let Some(email) = &stored.account.email {
            let message = self.welcome.render(&stored.account.username, email);
            self.notifications.submit(message);
        }

        let account = stored.into_account();
        let token = self.issue_token(&account)?;

        info!("Account registered: {} ({})", account.username, account.id);
        Ok(AuthSession { token, account })
    }

    /// Check credentials and sign the caller in
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession> {
        let Ok(username) = Username::from_stored(username) else {
            return Err(invalid_credentials());
        };

        let found = self
            .accounts
            .find_one(&AccountFilter::Username(username.clone()), HiddenFields::PASSWORD_HASH)
            .await
            .map_err(|e| {
                error!("Account lookup failed during login: {}", e);
                TallyError::Server(e.to_string())
            })?;

        let Some(stored) = found else {
            self.verify_decoy(password).await?;
            warn!("Login failed - account not found: {}", username);
            return Err(invalid_credentials());
        };

        let hash = stored
            .password_hash
            .as_ref()
            .ok_or_else(|| TallyError::Server("account lookup did not return a password hash".into()))?;

        if !self.credentials.verify(password, hash).await? {
            warn!("Login failed - invalid password: {}", username);
            return Err(invalid_credentials());
        }

        let account = stored.into_account();
        let token = self.issue_token(&account)?;

        info!("Login succeeded: {} ({})", account.username, account.id);
        Ok(AuthSession { token, account })
    }

    /// Fetch an account on behalf of its owner. Anyone else is refused
    /// before the store is consulted, so existence is not revealed.
    pub async fn get_one_auth(&self, requester: &AccountId, target: &AccountId) -> Result<Account> {
        if requester != target {
            warn!("Account {} refused access to account {}", requester, target);
            return Err(TallyError::Forbidden("forbidden".into()));
        }

        self.accounts
            .find_by_id(target)
            .await?
            .map(|stored| stored.into_account())
            .ok_or_else(|| TallyError::NotFound("account not found".into()))
    }

    /// Verify a session token against the registry's clock
    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        self.tokens.verify(token, self.clock.now())
    }

    fn issue_token(&self, account: &Account) -> Result<String> {
        self.tokens
            .issue(account.id.as_str(), account.username.as_str(), self.clock.now())
    }

    async fn verify_decoy(&self, password: &str) -> Result<()> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.credentials.hash("decoy-password-for-unknown-accounts"))
            .await?;
        self.credentials.verify(password, decoy).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HashCost, TokenExpiry};
    use crate::clock::ManualClock;
    use crate::db::InMemoryAccountStore;

    const NOW: u64 = 1_700_000_000;

    fn registry(store: Arc<InMemoryAccountStore>) -> AccountRegistry {
        let credentials = CredentialStore::new(HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        AccountRegistry::new(
            store,
            credentials,
            TokenService::new_dev(TokenExpiry::default()),
            Policies::default(),
            WelcomeTemplate {
                sender_domain: "example.com".into(),
                display_name: "Example".into(),
                product_name: "Example".into(),
                frontend_url: "http://localhost".into(),
            },
            NotificationQueue::disabled(),
        )
        .with_clock(Arc::new(ManualClock::new(NOW)))
    }

    fn request(username: &str, email: Option<&str>, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.map(Into::into),
            password: password.into(),
            password_confirmation: confirmation.into(),
        }
    }

    #[tokio::test]
    async fn test_validation_order() {
        let store = Arc::new(InMemoryAccountStore::new());
        let registry = registry(store.clone());

        // Mismatch is reported before anything else is looked at
        let err = registry.register(request("x", None, "a", "b")).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: password mismatch");

        let err = registry.register(request("x", None, "short", "short")).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: invalid password");

        let err = registry.register(request("x", None, "hunter22", "hunter22")).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation error: invalid username");

        let err = registry
            .register(request("alice", Some("not-an-email"), "hunter22", "hunter22"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: invalid email");

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_blank_email_is_absent() {
        let store = Arc::new(InMemoryAccountStore::new());
        let registry = registry(store);

        let session = registry
            .register(request("alice", Some("  "), "hunter22", "hunter22"))
            .await
            .unwrap();
        assert!(session.account.email.is_none());
    }

    #[tokio::test]
    async fn test_token_uses_clock() {
        let store = Arc::new(InMemoryAccountStore::new());
        let registry = registry(store);

        let session = registry
            .register(request("alice", None, "hunter22", "hunter22"))
            .await
            .unwrap();
        let claims = registry.authenticate(&session.token).unwrap();

        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + TokenExpiry::default().as_secs());
    }

    #[tokio::test]
    async fn test_login_with_empty_username() {
        let store = Arc::new(InMemoryAccountStore::new());
        let registry = registry(store);

        let err = registry.login("", "hunter22").await.unwrap_err();
        assert_eq!(err.to_string(), format!("Authentication error: {INVALID_CREDENTIALS}"));
    }

    #[tokio::test]
    async fn test_get_one_auth_missing_self() {
        let store = Arc::new(InMemoryAccountStore::new());
        let registry = registry(store);
        let id = AccountId::new("ghost").unwrap();

        let err = registry.get_one_auth(&id, &id).await.unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));
    }
}
