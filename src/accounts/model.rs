//! Account value objects
//!
//! Constructors enforce the invariants; once built, a `Username` or `Email`
//! is known to be well-formed.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::auth::{PasswordHash, UsernamePolicy};
use crate::types::{AccountId, InteractionKind, ResourceId, Result, TallyError};

/// A username accepted by the configured policy
///
/// Compared exactly: unlike emails, usernames keep their case, so `Alice`
/// and `alice` are different accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str, policy: &UsernamePolicy) -> Result<Self> {
        if !policy.allows(raw) {
            return Err(TallyError::Validation("invalid username".into()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap a username loaded from storage. The policy may have changed
    /// since it was created, so only emptiness is rejected.
    pub fn from_stored(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TallyError::Server("stored account has an empty username".into()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized (trimmed, lowercased) email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || TallyError::Validation("invalid email".into());
        let email = raw.trim().to_lowercase();

        if email.len() > 254 || email.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(invalid());
        }

        Ok(Self(email))
    }

    /// Parse an optional form field; blank counts as absent
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::parse(value).map(Some),
        }
    }

    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account as returned to callers. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub username: Username,
    /// Hidden unless explicitly loaded or just supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    pub likes: BTreeSet<ResourceId>,
    pub strikes: BTreeSet<ResourceId>,
}

impl Account {
    /// The like or strike set
    pub fn interactions(&self, kind: InteractionKind) -> &BTreeSet<ResourceId> {
        match kind {
            InteractionKind::Like => &self.likes,
            InteractionKind::Strike => &self.strikes,
        }
    }
}

/// Account as loaded from a store, possibly with the password hash
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub account: Account,
    /// Present only when the lookup asked for it
    pub password_hash: Option<PasswordHash>,
}

impl StoredAccount {
    /// Drop credential material
    pub fn into_account(self) -> Account {
        self.account
    }
}

/// Fields for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: Username,
    pub email: Option<Email>,
    pub password_hash: PasswordHash,
}
