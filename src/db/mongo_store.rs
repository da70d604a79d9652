//! MongoDB implementations of the store collaborators

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime, Document};
use tracing::{debug, warn};

use super::mongo::{parse_object_id, MongoClient, MongoCollection};
use super::schemas::{
    AccountDoc, ReceiptDoc, ResourceDoc, ACCOUNT_COLLECTION, RECEIPT_COLLECTION, RECEIPT_COUNTED,
    RECEIPT_PENDING, RECEIPT_RELEASED, RESOURCE_COLLECTION,
};
use super::store::{
    AccountFilter, AccountStore, ClaimOutcome, HiddenFields, InteractionKey, InteractionLedger,
    ResourceCounters, ResourceStore, StoreError,
};
use crate::accounts::{Account, Email, NewAccount, StoredAccount, Username};
use crate::auth::PasswordHash;
use crate::types::{AccountId, InteractionKind, ResourceId};

fn backend(err: impl ToString) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn resource_ids(ids: Vec<ObjectId>) -> Result<std::collections::BTreeSet<ResourceId>, StoreError> {
    ids.into_iter()
        .map(|oid| ResourceId::new(oid.to_hex()).map_err(backend))
        .collect()
}

/// Convert a (possibly projected) document into the domain shape
fn into_stored(doc: AccountDoc) -> Result<StoredAccount, StoreError> {
    let id = doc
        ._id
        .ok_or_else(|| StoreError::Backend("Account document without _id".into()))?;

    let password_hash = doc
        .password_hash
        .map(PasswordHash::from_phc)
        .transpose()
        .map_err(backend)?;

    Ok(StoredAccount {
        account: Account {
            id: AccountId::new(id.to_hex()).map_err(backend)?,
            username: Username::from_stored(doc.username).map_err(backend)?,
            email: doc.email.map(Email::from_stored),
            likes: resource_ids(doc.likes)?,
            strikes: resource_ids(doc.strikes)?,
        },
        password_hash,
    })
}

/// Projection removing the hidden fields not asked for
fn hidden_projection(hidden: HiddenFields) -> Option<Document> {
    let mut projection = Document::new();
    if !hidden.password_hash {
        projection.insert("password_hash", 0);
    }
    if !hidden.email {
        projection.insert("email", 0);
    }
    (!projection.is_empty()).then_some(projection)
}

fn account_filter(filter: &AccountFilter) -> Document {
    match filter {
        AccountFilter::Username(username) => doc! { "username": username.as_str() },
        AccountFilter::UsernameOrEmail { username, email } => doc! {
            "$or": [
                { "username": username.as_str() },
                { "email": email.as_str() },
            ]
        },
    }
}

/// Accounts in the `accounts` collection
#[derive(Clone)]
pub struct MongoAccountStore {
    accounts: MongoCollection<AccountDoc>,
}

impl MongoAccountStore {
    pub async fn open(client: &MongoClient) -> Result<Self, StoreError> {
        Ok(Self {
            accounts: client.collection(ACCOUNT_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn find_one(
        &self,
        filter: &AccountFilter,
        hidden: HiddenFields,
    ) -> Result<Option<StoredAccount>, StoreError> {
        self.accounts
            .find_one(account_filter(filter), hidden_projection(hidden))
            .await?
            .map(into_stored)
            .transpose()
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<StoredAccount>, StoreError> {
        let oid = match ObjectId::parse_str(id.as_str()) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        self.accounts
            .find_one(doc! { "_id": oid }, hidden_projection(HiddenFields::NONE))
            .await?
            .map(into_stored)
            .transpose()
    }

    async fn create(&self, new: NewAccount) -> Result<StoredAccount, StoreError> {
        let doc = AccountDoc::new(
            new.username.as_str().to_string(),
            new.email.as_ref().map(|e| e.as_str().to_string()),
            new.password_hash.as_phc().to_string(),
        );

        let oid = self.accounts.insert_one(doc).await?;
        debug!("Account document inserted: {}", oid);

        Ok(StoredAccount {
            account: Account {
                id: AccountId::new(oid.to_hex()).map_err(backend)?,
                username: new.username,
                email: new.email,
                likes: Default::default(),
                strikes: Default::default(),
            },
            password_hash: None,
        })
    }

    async fn add_to_set(
        &self,
        id: &AccountId,
        kind: InteractionKind,
        resource: &ResourceId,
    ) -> Result<bool, StoreError> {
        let account_oid = parse_object_id(id.as_str(), "account")?;
        let resource_oid = parse_object_id(resource.as_str(), "resource")?;

        let result = self
            .accounts
            .update_one(
                doc! { "_id": account_oid, "metadata.is_deleted": { "$ne": true } },
                doc! { "$addToSet": { kind.field(): resource_oid } },
                false,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }

        Ok(result.modified_count == 1)
    }
}

/// Resource counters in the `resources` collection
#[derive(Clone)]
pub struct MongoResourceStore {
    resources: MongoCollection<ResourceDoc>,
}

impl MongoResourceStore {
    pub async fn open(client: &MongoClient) -> Result<Self, StoreError> {
        Ok(Self {
            resources: client.collection(RESOURCE_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl ResourceStore for MongoResourceStore {
    async fn find_by_id(&self, id: &ResourceId) -> Result<Option<ResourceCounters>, StoreError> {
        let oid = match ObjectId::parse_str(id.as_str()) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };

        let doc = self.resources.find_one(doc! { "_id": oid }, None).await?;
        Ok(doc.map(|d| ResourceCounters {
            id: id.clone(),
            likes: d.likes,
            strikes: d.strikes,
        }))
    }

    async fn increment(
        &self,
        id: &ResourceId,
        kind: InteractionKind,
        amount: i64,
    ) -> Result<(), StoreError> {
        let oid = parse_object_id(id.as_str(), "resource")?;

        let result = self
            .resources
            .update_one(
                doc! { "_id": oid, "metadata.is_deleted": { "$ne": true } },
                doc! {
                    "$inc": { kind.field(): amount },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
                false,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }
}

/// Interaction receipts in the `interaction_receipts` collection
#[derive(Clone)]
pub struct MongoInteractionLedger {
    receipts: MongoCollection<ReceiptDoc>,
    lease: Duration,
}

impl MongoInteractionLedger {
    pub async fn open(client: &MongoClient, lease: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            receipts: client.collection(RECEIPT_COLLECTION).await?,
            lease,
        })
    }
}

fn receipt_filter(key: &InteractionKey) -> Document {
    doc! {
        "account_id": key.account.as_str(),
        "resource_id": key.resource.as_str(),
        "kind": key.kind.as_str(),
    }
}

/// Receipts a claim may take over: released ones, and pending ones whose
/// lease ran out before `stale_before`
fn claimable_filter(key: &InteractionKey, stale_before: DateTime) -> Document {
    let mut filter = receipt_filter(key);
    filter.insert(
        "$or",
        vec![
            doc! { "state": RECEIPT_RELEASED },
            doc! { "state": RECEIPT_PENDING, "claimed_at": { "$lt": stale_before } },
        ],
    );
    filter
}

#[async_trait]
impl InteractionLedger for MongoInteractionLedger {
    async fn claim(&self, key: &InteractionKey) -> Result<ClaimOutcome, StoreError> {
        let now = DateTime::now();
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let stale_before = DateTime::from_millis(now.timestamp_millis().saturating_sub(lease_ms));

        // Inserts when no receipt exists. A live pending or counted receipt
        // does not match, and the upsert then collides with the unique index.
        let update = doc! {
            "$set": {
                "state": RECEIPT_PENDING,
                "claimed_at": now,
                "metadata.updated_at": now,
            },
            "$setOnInsert": { "metadata.created_at": now, "metadata.is_deleted": false },
        };

        match self
            .receipts
            .update_one(claimable_filter(key, stale_before), update, true)
            .await
        {
            Ok(_) => Ok(ClaimOutcome::Claimed),
            Err(StoreError::Duplicate(_)) => {
                let existing = self.receipts.find_one(receipt_filter(key), None).await?;
                match existing {
                    Some(receipt) if receipt.is_counted() => Ok(ClaimOutcome::Counted),
                    _ => Err(StoreError::InFlight(key.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn confirm(&self, key: &InteractionKey) -> Result<(), StoreError> {
        let mut filter = receipt_filter(key);
        filter.insert("state", RECEIPT_PENDING);

        let result = self
            .receipts
            .update_one(
                filter,
                doc! { "$set": { "state": RECEIPT_COUNTED, "metadata.updated_at": DateTime::now() } },
                false,
            )
            .await?;

        if result.matched_count == 0 {
            warn!("Confirmed receipt was no longer pending: {}", key);
        }
        Ok(())
    }

    async fn release(&self, key: &InteractionKey) -> Result<(), StoreError> {
        let mut filter = receipt_filter(key);
        filter.insert("state", RECEIPT_PENDING);

        self.receipts
            .update_one(
                filter,
                doc! { "$set": { "state": RECEIPT_RELEASED, "metadata.updated_at": DateTime::now() } },
                false,
            )
            .await?;
        Ok(())
    }
}
