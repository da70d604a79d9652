//! Account document schema
//!
//! `password_hash` and `email` are projected out of lookups unless asked
//! for, which is why both deserialize as optional.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for accounts
pub const ACCOUNT_COLLECTION: &str = "accounts";

/// Account document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AccountDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub username: String,

    /// Argon2 PHC string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Lowercased; absent rather than null so the partial unique index
    /// ignores accounts without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Liked resource IDs
    #[serde(default)]
    pub likes: Vec<ObjectId>,

    /// Struck resource IDs
    #[serde(default)]
    pub strikes: Vec<ObjectId>,
}

impl AccountDoc {
    pub fn new(username: String, email: Option<String>, password_hash: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            username,
            password_hash: Some(password_hash),
            email,
            likes: Vec::new(),
            strikes: Vec::new(),
        }
    }
}

impl IntoIndexes for AccountDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            // Only documents that carry an email take part in uniqueness
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "email": { "$exists": true } })
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AccountDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
