//! Persistence for Tallyho
//!
//! Store collaborator traits, their MongoDB implementations and in-memory
//! equivalents.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use memory::{InMemoryAccountStore, InMemoryInteractionLedger, InMemoryResourceStore};
pub use mongo::{MongoClient, MongoCollection};
pub use mongo_store::{MongoAccountStore, MongoInteractionLedger, MongoResourceStore};
pub use store::{
    AccountFilter, AccountStore, ClaimOutcome, HiddenFields, InteractionKey, InteractionLedger,
    ResourceCounters, ResourceStore, StoreError, DEFAULT_CLAIM_LEASE,
};
