//! Account identity: value objects and the registry that creates and
//! authenticates accounts

pub mod model;
pub mod registry;

pub use model::{Account, Email, NewAccount, StoredAccount, Username};
pub use registry::{AccountRegistry, AuthSession, RegisterRequest, INVALID_CREDENTIALS};
