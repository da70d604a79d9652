//! Interaction receipt schema
//!
//! One document per (account, resource, kind). `state` moves from
//! `pending` (increment in progress since `claimed_at`) to `counted`, or
//! to `released` when the increment failed.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for interaction receipts
pub const RECEIPT_COLLECTION: &str = "interaction_receipts";

pub const RECEIPT_PENDING: &str = "pending";
pub const RECEIPT_COUNTED: &str = "counted";
pub const RECEIPT_RELEASED: &str = "released";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ReceiptDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub account_id: String,

    pub resource_id: String,

    /// "like" or "strike"
    pub kind: String,

    /// One of `pending`, `counted`, `released`
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime>,
}

impl ReceiptDoc {
    pub fn is_counted(&self) -> bool {
        self.state == RECEIPT_COUNTED
    }
}

impl IntoIndexes for ReceiptDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "account_id": 1, "resource_id": 1, "kind": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("interaction_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ReceiptDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
