//! Tallyho - account credentials, session tokens and interaction tallies
//!
//! ## Components
//!
//! - **Accounts**: registration, login and owner-only account lookup
//! - **Auth**: Argon2 password hashing, username/password policies, JWT sessions
//! - **Interactions**: like/strike recording across accounts and resources
//! - **Notify**: fire-and-forget welcome emails (Mailgun or log)
//! - **DB**: store traits with MongoDB and in-memory implementations

pub mod accounts;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod interactions;
pub mod notify;
pub mod types;

pub use accounts::AccountRegistry;
pub use config::Args;
pub use interactions::InteractionCoordinator;
pub use types::{Result, TallyError};
