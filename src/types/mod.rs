//! Shared types for Tallyho

pub mod error;
pub mod model;

pub use error::{PartialFailure, Result, TallyError, UniqueField};
pub use model::{AccountId, InteractionKind, ResourceId};
