//! Background delivery queue
//!
//! `submit` never waits: a full or closed queue drops the message with a
//! warning. One task drains the channel and calls the notifier.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EmailMessage, Notifier};

/// Handle for submitting messages to the delivery task
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    tx: Option<mpsc::Sender<EmailMessage>>,
}

impl NotificationQueue {
    /// Start the delivery task. Must be called inside a Tokio runtime.
    ///
    /// The task ends once every queue handle has been dropped and the
    /// remaining messages are delivered.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(delivery_task(rx, notifier));
        (Self { tx: Some(tx) }, handle)
    }

    /// A queue that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Hand a message to the delivery task. Returns whether it was queued.
    pub fn submit(&self, message: EmailMessage) -> bool {
        let Some(tx) = &self.tx else {
            debug!("Notification queue disabled, dropping message to {}", message.to);
            return false;
        };

        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!("Notification queue full, dropping message to {}", message.to);
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!("Notification queue closed, dropping message to {}", message.to);
                false
            }
        }
    }
}

async fn delivery_task(mut rx: mpsc::Receiver<EmailMessage>, notifier: Arc<dyn Notifier>) {
    while let Some(message) = rx.recv().await {
        match notifier.send(&message).await {
            Ok(()) => info!("Notification delivered to {}", message.to),
            Err(e) => warn!("Notification to {} failed: {}", message.to, e),
        }
    }
    debug!("Notification delivery task finished");
}
