//! Authentication for Tallyho
//!
//! Provides:
//! - Password hashing with Argon2 (`CredentialStore`)
//! - Username and password policies
//! - Session token issuance and verification (`TokenService`)

pub mod jwt;
pub mod password;
pub mod policy;

pub use jwt::{extract_token_from_header, Claims, ExpiryUnit, TokenExpiry, TokenService};
pub use password::{hash_password, verify_password, CredentialStore, HashCost, PasswordHash};
pub use policy::{PasswordPolicy, Policies, UsernamePolicy};
