//! Interaction dual write
//!
//! Recording a like or strike touches two aggregates that live in separate
//! stores with no shared transaction:
//!
//! - account side: add the resource ID to the acting account's like or
//!   strike set (a membership add, naturally idempotent)
//! - resource side: bump the resource's counter, guarded by a receipt in the
//!   [`InteractionLedger`] so each (account, resource, kind) is counted once
//!
//! Both writes run concurrently and the call succeeds only if both do.
//! This is a best-effort dual write, not a transaction: when one side fails
//! the other is left applied and the caller gets
//! [`TallyError::PartialFailure`] naming the failed side. Retrying is safe;
//! the set add is idempotent and the receipt keeps the counter from being
//! incremented twice.
//!
//! The receipt is only marked counted after the increment succeeded. While
//! another call's increment is in progress the resource side fails with
//! [`StoreError::InFlight`] rather than reporting the pair as counted.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{
    AccountStore, ClaimOutcome, InteractionKey, InteractionLedger, ResourceStore, StoreError,
};
use crate::types::{AccountId, InteractionKind, PartialFailure, ResourceId, Result, TallyError};

/// What a successful interaction changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionOutcome {
    pub kind: InteractionKind,
    pub account: AccountId,
    pub resource: ResourceId,
    /// False when the resource was already in the account's set
    pub newly_added: bool,
    /// False when the counter had already been incremented for this pair
    pub counted: bool,
}

/// Records likes and strikes
pub struct InteractionCoordinator {
    accounts: Arc<dyn AccountStore>,
    resources: Arc<dyn ResourceStore>,
    ledger: Arc<dyn InteractionLedger>,
}

impl InteractionCoordinator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        resources: Arc<dyn ResourceStore>,
        ledger: Arc<dyn InteractionLedger>,
    ) -> Self {
        Self {
            accounts,
            resources,
            ledger,
        }
    }

    pub async fn like(&self, resource: &ResourceId, acting: &AccountId) -> Result<InteractionOutcome> {
        self.record(InteractionKind::Like, resource, acting).await
    }

    pub async fn strike(&self, resource: &ResourceId, acting: &AccountId) -> Result<InteractionOutcome> {
        self.record(InteractionKind::Strike, resource, acting).await
    }

    /// Record `kind` by `acting` against `resource`.
    ///
    /// A side that committed is not rolled back when the other fails.
    pub async fn record(
        &self,
        kind: InteractionKind,
        resource: &ResourceId,
        acting: &AccountId,
    ) -> Result<InteractionOutcome> {
        let key = InteractionKey {
            account: acting.clone(),
            resource: resource.clone(),
            kind,
        };

        let (account_side, resource_side) = tokio::join!(
            self.accounts.add_to_set(acting, kind, resource),
            self.count_once(&key),
        );

        match (account_side, resource_side) {
            (Ok(newly_added), Ok(counted)) => {
                info!(
                    "Recorded {} of {} by {} (newly_added={}, counted={})",
                    kind, resource, acting, newly_added, counted
                );
                Ok(InteractionOutcome {
                    kind,
                    account: acting.clone(),
                    resource: resource.clone(),
                    newly_added,
                    counted,
                })
            }
            (account_side, resource_side) => {
                let failure = PartialFailure {
                    account: account_side.err().map(|e| e.to_string()),
                    resource: resource_side.err().map(|e| e.to_string()),
                };
                warn!("Partial failure recording {} of {} by {}: {}", kind, resource, acting, failure);
                Err(TallyError::PartialFailure(failure))
            }
        }
    }

    /// Increment the counter unless this pair was already counted. Returns
    /// whether it incremented.
    async fn count_once(&self, key: &InteractionKey) -> std::result::Result<bool, StoreError> {
        if self.ledger.claim(key).await? == ClaimOutcome::Counted {
            debug!("{} already counted", key);
            return Ok(false);
        }

        if let Err(e) = self.resources.increment(&key.resource, key.kind, 1).await {
            // Give the claim back so a retry can count it. If that fails too,
            // the claim lapses with its lease.
            if let Err(release_err) = self.ledger.release(key).await {
                error!("Failed to release receipt for {}: {}", key, release_err);
            }
            return Err(e);
        }

        if let Err(e) = self.ledger.confirm(key).await {
            // The counter moved; a retry after the lease may count it again
            error!("Counted {} but failed to confirm its receipt: {}", key, e);
            return Err(e);
        }

        Ok(true)
    }
}
