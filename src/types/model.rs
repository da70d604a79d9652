//! Identifiers shared by the account and interaction layers

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Result, TallyError};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a non-empty identifier
            pub fn new(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(TallyError::Validation(concat!("empty ", $label).into()));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of an account, assigned by the account store
    AccountId,
    "account id"
);

opaque_id!(
    /// Identifier of an externally owned resource
    ResourceId,
    "resource id"
);

/// Kind of interaction an account records against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Strike,
}

impl InteractionKind {
    /// Name of the account set and of the resource counter for this kind
    pub fn field(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Strike => "strikes",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Strike => "strike",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
