//! In-process request queue between the HTTP layer and the handler.
//!
//! Requests are buffered as raw bytes in a bounded channel. Publishing never waits:
//! a full queue is reported back to the caller so it can shed load.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler::{HandleOutcome, NotifierHandler};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    #[error("Notification queue is full")]
    Full,
    #[error("Notification queue is closed")]
    Closed,
}

/// Create a queue holding at most `capacity` pending requests.
pub fn channel(capacity: usize) -> (QueuePublisher, QueueConsumer) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (QueuePublisher { sender }, QueueConsumer { receiver })
}

/// Sending half. Cheap to clone.
#[derive(Clone)]
pub struct QueuePublisher {
    sender: mpsc::Sender<Vec<u8>>,
}

impl QueuePublisher {
    pub fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::Full,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }

    /// Free slots left in the queue.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

/// Counts of handled requests by outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub delivered: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: &HandleOutcome) {
        match outcome {
            HandleOutcome::Delivered => self.delivered += 1,
            HandleOutcome::Rejected(_) => self.rejected += 1,
            HandleOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.delivered + self.rejected + self.failed
    }
}

/// Receiving half; drains requests into a [`NotifierHandler`] one at a time.
pub struct QueueConsumer {
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl QueueConsumer {
    /// Run until `cancel` fires or every publisher is dropped.
    pub async fn run(
        mut self,
        handler: Arc<NotifierHandler>,
        cancel: CancellationToken,
    ) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        info!("Queue consumer started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Queue consumer cancelled");
                    break;
                }
                message = self.receiver.recv() => {
                    let Some(payload) = message else {
                        debug!("Queue closed");
                        break;
                    };
                    let outcome = handler.handle(&payload).await;
                    stats.record(&outcome);
                }
            }
        }

        info!(
            delivered = stats.delivered,
            rejected = stats.rejected,
            failed = stats.failed,
            "Queue consumer stopped"
        );
        stats
    }
}
