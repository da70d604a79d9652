//! In-memory store collaborators
//!
//! Same contracts as the MongoDB stores, including uniqueness on username
//! and email and the atomic ledger claim. Used for tests and local tooling.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::store::{
    AccountFilter, AccountStore, ClaimOutcome, HiddenFields, InteractionKey, InteractionLedger,
    ResourceCounters, ResourceStore, StoreError, DEFAULT_CLAIM_LEASE,
};
use crate::accounts::{Account, NewAccount, StoredAccount};
use crate::auth::PasswordHash;
use crate::clock::{Clock, SystemClock};
use crate::types::{AccountId, InteractionKind, ResourceId, UniqueField};

struct AccountRow {
    account: Account,
    password_hash: PasswordHash,
}

impl AccountRow {
    fn project(&self, hidden: HiddenFields) -> StoredAccount {
        let mut account = self.account.clone();
        if !hidden.email {
            account.email = None;
        }
        StoredAccount {
            account,
            password_hash: hidden.password_hash.then(|| self.password_hash.clone()),
        }
    }

    fn matches(&self, filter: &AccountFilter) -> bool {
        match filter {
            AccountFilter::Username(username) => &self.account.username == username,
            AccountFilter::UsernameOrEmail { username, email } => {
                &self.account.username == username || self.account.email.as_ref() == Some(email)
            }
        }
    }
}

/// Account store backed by a map
#[derive(Default)]
pub struct InMemoryAccountStore {
    rows: RwLock<HashMap<AccountId, AccountRow>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of accounts holding `username`
    pub async fn count_username(&self, username: &str) -> usize {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| row.account.username.as_str() == username)
            .count()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_one(
        &self,
        filter: &AccountFilter,
        hidden: HiddenFields,
    ) -> Result<Option<StoredAccount>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|row| row.matches(filter))
            .map(|row| row.project(hidden)))
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<StoredAccount>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(id).map(|row| row.project(HiddenFields::NONE)))
    }

    async fn create(&self, new: NewAccount) -> Result<StoredAccount, StoreError> {
        // Check and insert under one write lock, like a unique index would
        let mut rows = self.rows.write().await;

        if rows.values().any(|row| row.account.username == new.username) {
            return Err(StoreError::Duplicate(Some(UniqueField::Username)));
        }
        if let Some(email) = &new.email {
            if rows.values().any(|row| row.account.email.as_ref() == Some(email)) {
                return Err(StoreError::Duplicate(Some(UniqueField::Email)));
            }
        }

        let id = AccountId::new(uuid::Uuid::new_v4().simple().to_string())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let account = Account {
            id: id.clone(),
            username: new.username,
            email: new.email,
            likes: BTreeSet::new(),
            strikes: BTreeSet::new(),
        };

        debug!("In-memory account created: {}", id);
        rows.insert(
            id,
            AccountRow {
                account: account.clone(),
                password_hash: new.password_hash,
            },
        );

        Ok(StoredAccount {
            account,
            password_hash: None,
        })
    }

    async fn add_to_set(
        &self,
        id: &AccountId,
        kind: InteractionKind,
        resource: &ResourceId,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;

        let set = match kind {
            InteractionKind::Like => &mut row.account.likes,
            InteractionKind::Strike => &mut row.account.strikes,
        };
        Ok(set.insert(resource.clone()))
    }
}

/// Resource counters backed by a map
#[derive(Default)]
pub struct InMemoryResourceStore {
    counters: RwLock<HashMap<ResourceId, ResourceCounters>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource with zeroed counters, standing in for the
    /// collaborator that owns resource creation. Existing counters are kept.
    pub async fn seed(&self, id: ResourceId) {
        self.counters
            .write()
            .await
            .entry(id.clone())
            .or_insert(ResourceCounters {
                id,
                likes: 0,
                strikes: 0,
            });
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<ResourceCounters>, StoreError> {
        Ok(self.counters.read().await.get(id).cloned())
    }

    async fn increment(
        &self,
        id: &ResourceId,
        kind: InteractionKind,
        amount: i64,
    ) -> Result<(), StoreError> {
        let mut counters = self.counters.write().await;
        let entry = counters
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;

        match kind {
            InteractionKind::Like => entry.likes += amount,
            InteractionKind::Strike => entry.strikes += amount,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receipt {
    Pending { claimed_at: u64 },
    Counted,
}

/// Interaction receipts backed by a map. Absent keys are unclaimed.
pub struct InMemoryInteractionLedger {
    receipts: Mutex<HashMap<InteractionKey, Receipt>>,
    lease_secs: u64,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryInteractionLedger {
    fn default() -> Self {
        Self::with_clock(DEFAULT_CLAIM_LEASE, Arc::new(SystemClock))
    }
}

impl InMemoryInteractionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose claim lease is measured on `clock`
    pub fn with_clock(lease: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            receipts: Mutex::new(HashMap::new()),
            lease_secs: lease.as_secs(),
            clock,
        }
    }

    /// Whether the increment for this interaction has been confirmed
    pub async fn is_counted(&self, key: &InteractionKey) -> bool {
        matches!(self.receipts.lock().await.get(key), Some(Receipt::Counted))
    }

    /// Whether a claim on this interaction is awaiting confirm or release
    pub async fn is_pending(&self, key: &InteractionKey) -> bool {
        matches!(self.receipts.lock().await.get(key), Some(Receipt::Pending { .. }))
    }
}

#[async_trait]
impl InteractionLedger for InMemoryInteractionLedger {
    async fn claim(&self, key: &InteractionKey) -> Result<ClaimOutcome, StoreError> {
        let now = self.clock.now();
        let mut receipts = self.receipts.lock().await;

        match receipts.get(key) {
            Some(Receipt::Counted) => return Ok(ClaimOutcome::Counted),
            Some(Receipt::Pending { claimed_at }) if now < claimed_at.saturating_add(self.lease_secs) => {
                return Err(StoreError::InFlight(key.to_string()));
            }
            Some(Receipt::Pending { .. }) => debug!("Reclaiming stale receipt: {}", key),
            None => {}
        }

        receipts.insert(key.clone(), Receipt::Pending { claimed_at: now });
        Ok(ClaimOutcome::Claimed)
    }

    async fn confirm(&self, key: &InteractionKey) -> Result<(), StoreError> {
        self.receipts.lock().await.insert(key.clone(), Receipt::Counted);
        Ok(())
    }

    async fn release(&self, key: &InteractionKey) -> Result<(), StoreError> {
        let mut receipts = self.receipts.lock().await;
        if matches!(receipts.get(key), Some(Receipt::Pending { .. })) {
            receipts.remove(key);
        }
        Ok(())
    }
}
