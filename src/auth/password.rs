//! Password hashing and verification using Argon2
//!
//! Uses the argon2id variant. The cost parameters come from configuration;
//! the PHC string stores them alongside the salt, so verification works for
//! hashes produced under an older cost.

use std::fmt;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash as PhcString, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::types::{Result, TallyError};

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory size in KiB (m_cost)
    pub memory_kib: u32,
    /// Number of passes (t_cost)
    pub iterations: u32,
    /// Degree of parallelism (p_cost)
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    fn params(&self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| TallyError::Config(format!("Invalid password hash cost: {e}")))
    }
}

/// A PHC-formatted Argon2 hash.
///
/// Only produced by hashing or by parsing a stored PHC string. Never
/// serialized and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a hash loaded from storage, rejecting anything that is not a
    /// PHC string
    pub fn from_phc(phc: impl Into<String>) -> Result<Self> {
        let phc = phc.into();
        PhcString::new(&phc)
            .map_err(|e| TallyError::Server(format!("Invalid password hash format: {e}")))?;
        Ok(Self(phc))
    }

    pub fn as_phc(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Hash a password using Argon2id with the given cost
pub fn hash_password(password: &str, cost: &HashCost) -> Result<PasswordHash> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, cost.params()?);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| PasswordHash(hash.to_string()))
        .map_err(|e| TallyError::Server(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// Returns true if the password matches the hash.
pub fn verify_password(password: &str, hash: &PasswordHash) -> Result<bool> {
    let parsed_hash = PhcString::new(hash.as_phc())
        .map_err(|e| TallyError::Server(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hashes and verifies passwords off the async runtime
#[derive(Debug, Clone)]
pub struct CredentialStore {
    cost: HashCost,
}

impl CredentialStore {
    /// Create a credential store, rejecting cost parameters Argon2 refuses
    pub fn new(cost: HashCost) -> Result<Self> {
        cost.params()?;
        Ok(Self { cost })
    }

    pub fn cost(&self) -> HashCost {
        self.cost
    }

    /// Derive a salted hash for `password`
    pub async fn hash(&self, password: &str) -> Result<PasswordHash> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash_password(&password, &cost)).await?
    }

    /// Check `password` against `hash`. A mismatch is `Ok(false)`.
    pub async fn verify(&self, password: &str, hash: &PasswordHash) -> Result<bool> {
        let password = password.to_owned();
        let hash = hash.clone();
        tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?
    }
}
