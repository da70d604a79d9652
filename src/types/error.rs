//! Error types for Tallyho
//!
//! Every operation in the crate returns [`TallyError`]. Store collaborators
//! have their own [`StoreError`](crate::db::StoreError) which is converted
//! here, except where a caller needs to look at it first (uniqueness races
//! during registration).

use std::fmt;

use serde::Serialize;

/// Field guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    Username,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username => f.write_str("username"),
            Self::Email => f.write_str("email"),
        }
    }
}

/// Which side of an interaction dual write failed.
///
/// A side with `None` succeeded and its write stays applied; nothing is
/// rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    /// Error from the account-side set update, if it failed
    pub account: Option<String>,
    /// Error from the resource-side counter update, if it failed
    pub resource: Option<String>,
}

impl PartialFailure {
    pub fn account_failed(&self) -> bool {
        self.account.is_some()
    }

    pub fn resource_failed(&self) -> bool {
        self.resource.is_some()
    }
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.account, &self.resource) {
            (Some(a), Some(r)) => write!(f, "account write failed ({a}); resource write failed ({r})"),
            (Some(a), None) => write!(f, "account write failed ({a}); resource write applied"),
            (None, Some(r)) => write!(f, "resource write failed ({r}); account write applied"),
            (None, None) => f.write_str("no write failed"),
        }
    }
}

/// Main error type for Tallyho operations
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0} taken")]
    Conflict(UniqueField),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Partial failure: {0}")]
    PartialFailure(PartialFailure),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TallyError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Conflict(UniqueField::Username) => "USERNAME_TAKEN",
            Self::Conflict(UniqueField::Email) => "EMAIL_TAKEN",
            Self::Auth(_) => "INVALID_CREDENTIALS",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Server(_) => "SERVER_ERROR",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid(_) => "TOKEN_INVALID",
            Self::PartialFailure(_) => "PARTIAL_FAILURE",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Infrastructure faults are safe for the caller to retry. Input and
    /// credential errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server(_) | Self::PartialFailure(_))
    }
}

impl From<crate::db::StoreError> for TallyError {
    fn from(err: crate::db::StoreError) -> Self {
        Self::Server(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TallyError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Server(format!("Background task failed: {}", err))
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Server(format!("JSON error: {}", err))
    }
}

/// Result type alias for Tallyho operations
pub type Result<T> = std::result::Result<T, TallyError>;
