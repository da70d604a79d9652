//! Store collaborator interfaces
//!
//! The account registry and the interaction coordinator only talk to these
//! traits. MongoDB implementations live in [`super::mongo_store`], in-memory
//! ones in [`super::memory`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::accounts::{Email, NewAccount, StoredAccount, Username};
use crate::types::{AccountId, InteractionKind, ResourceId, UniqueField};

/// Errors reported by store collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. The field is known when
    /// the store can tell which constraint fired.
    #[error("Duplicate key{}", duplicate_suffix(.0))]
    Duplicate(Option<UniqueField>),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another caller holds an unexpired claim on the same receipt
    #[error("Interaction in flight: {0}")]
    InFlight(String),

    #[error("Database error: {0}")]
    Backend(String),
}

fn duplicate_suffix(field: &Option<UniqueField>) -> String {
    field.map(|f| format!(" on {f}")).unwrap_or_default()
}

/// Lookup predicate for accounts
#[derive(Debug, Clone)]
pub enum AccountFilter {
    Username(Username),
    /// Registration lookup: either field matches
    UsernameOrEmail { username: Username, email: Email },
}

impl AccountFilter {
    /// Build the registration lookup; email is only considered when given
    pub fn for_registration(username: &Username, email: Option<&Email>) -> Self {
        match email {
            Some(email) => Self::UsernameOrEmail {
                username: username.clone(),
                email: email.clone(),
            },
            None => Self::Username(username.clone()),
        }
    }
}

/// Normally hidden fields a lookup should include
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HiddenFields {
    pub password_hash: bool,
    pub email: bool,
}

impl HiddenFields {
    pub const NONE: Self = Self {
        password_hash: false,
        email: false,
    };

    pub const PASSWORD_HASH: Self = Self {
        password_hash: true,
        email: false,
    };

    pub const EMAIL: Self = Self {
        password_hash: false,
        email: true,
    };
}

/// Account aggregate storage
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// First account matching `filter`, with the requested hidden fields
    async fn find_one(
        &self,
        filter: &AccountFilter,
        hidden: HiddenFields,
    ) -> Result<Option<StoredAccount>, StoreError>;

    /// Account by ID, hidden fields excluded
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<StoredAccount>, StoreError>;

    /// Persist a new account with empty like/strike sets. Uniqueness
    /// violations are reported as [`StoreError::Duplicate`].
    async fn create(&self, account: NewAccount) -> Result<StoredAccount, StoreError>;

    /// Add `resource` to the account's like or strike set. Returns whether
    /// it was newly added. A missing account is [`StoreError::NotFound`].
    async fn add_to_set(
        &self,
        id: &AccountId,
        kind: InteractionKind,
        resource: &ResourceId,
    ) -> Result<bool, StoreError>;
}

/// Counters held by a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceCounters {
    pub id: ResourceId,
    pub likes: i64,
    pub strikes: i64,
}

impl ResourceCounters {
    pub fn count(&self, kind: InteractionKind) -> i64 {
        match kind {
            InteractionKind::Like => self.likes,
            InteractionKind::Strike => self.strikes,
        }
    }
}

/// Resource aggregate storage. Resources are created elsewhere; this core
/// only reads and increments their counters.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<ResourceCounters>, StoreError>;

    /// Add `amount` to the like or strike counter. A missing resource is
    /// [`StoreError::NotFound`].
    async fn increment(
        &self,
        id: &ResourceId,
        kind: InteractionKind,
        amount: i64,
    ) -> Result<(), StoreError>;
}

/// Dedup record for one (account, resource, kind) interaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InteractionKey {
    pub account: AccountId,
    pub resource: ResourceId,
    pub kind: InteractionKind,
}

impl std::fmt::Display for InteractionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {} by {}", self.kind, self.resource, self.account)
    }
}

/// How long a pending receipt blocks other callers before it may be
/// reclaimed
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(30);

/// Result of claiming a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The receipt is now pending and this caller owns the increment
    Claimed,
    /// The increment was already confirmed by an earlier call
    Counted,
}

/// Per-pair receipts guarding counter increments.
///
/// A receipt is absent, pending or counted:
///
/// - absent → pending on `claim`
/// - pending → counted on `confirm`, once the increment succeeded
/// - pending → absent on `release`, when the increment failed
///
/// A pending receipt older than the lease can be claimed again, so a lost
/// `release` only delays counting. The lease must outlast an increment.
#[async_trait]
pub trait InteractionLedger: Send + Sync {
    /// Take the receipt. A pending receipt still inside its lease is
    /// [`StoreError::InFlight`], never [`ClaimOutcome::Counted`].
    async fn claim(&self, key: &InteractionKey) -> Result<ClaimOutcome, StoreError>;

    /// Mark a pending receipt counted after its increment succeeded
    async fn confirm(&self, key: &InteractionKey) -> Result<(), StoreError>;

    /// Drop a pending receipt whose increment failed, so a retry can count it
    async fn release(&self, key: &InteractionKey) -> Result<(), StoreError>;
}
