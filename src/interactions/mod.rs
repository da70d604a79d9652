//! Like/strike recording across the account and resource aggregates

pub mod coordinator;

pub use coordinator::{InteractionCoordinator, InteractionOutcome};
