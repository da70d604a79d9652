//! Database schemas for Tallyho
//!
//! MongoDB document structures for accounts, resources and interaction
//! receipts.

mod account;
mod metadata;
mod receipt;
mod resource;

pub use account::{AccountDoc, ACCOUNT_COLLECTION};
pub use metadata::Metadata;
pub use receipt::{
    ReceiptDoc, RECEIPT_COLLECTION, RECEIPT_COUNTED, RECEIPT_PENDING, RECEIPT_RELEASED,
};
pub use resource::{ResourceDoc, RESOURCE_COLLECTION};
