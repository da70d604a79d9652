//! Resource document schema
//!
//! Resources are owned by another service. Only the counters this crate
//! increments are mapped; other fields are left untouched.

use bson::{oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for resources
pub const RESOURCE_COLLECTION: &str = "resources";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ResourceDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub likes: i64,

    #[serde(default)]
    pub strikes: i64,
}

impl IntoIndexes for ResourceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}

impl MutMetadata for ResourceDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
