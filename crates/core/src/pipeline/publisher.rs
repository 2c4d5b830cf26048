//! # Progress Publisher
//!
//! Fire-and-forget sink for [`ProgressEvent`]s. Delivery is best effort;
//! the job wrapper logs and drops any error a publisher returns.

use anyhow::Result;
use tokio::sync::broadcast;

use super::events::ProgressEvent;

pub trait ProgressPublisher: Send + Sync {
    fn publish(&self, event: ProgressEvent) -> Result<()>;
}

/// Fans events out to every live subscriber
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressPublisher for BroadcastPublisher {
    fn publish(&self, event: ProgressEvent) -> Result<()> {
        // An error here only means nobody is listening
        if self.tx.send(event).is_err() {
            tracing::debug!("No progress subscribers");
        }
        Ok(())
    }
}

/// Discards every event
pub struct NullPublisher;

impl ProgressPublisher for NullPublisher {
    fn publish(&self, _event: ProgressEvent) -> Result<()> {
        Ok(())
    }
}
