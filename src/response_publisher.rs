//! Outbound messaging abstraction: the one-way channel the core publishes
//! outcomes and progress events on. The concrete transport (Kafka or
//! otherwise) is an external collaborator; this trait is the only contract
//! in scope, mirroring the upstream one-way message publisher's shape.

use crate::outcome::LifecycleOutcome;
use crate::progress::ProgressEvent;
use std::sync::mpsc::Sender;

pub trait ResponsePublisher: Send + Sync {
    fn publish_outcome(&self, outcome: LifecycleOutcome);

    fn publish_event(&self, request_id: &str, event: ProgressEvent) {
        let _ = (request_id, event);
    }

    fn clone_dyn(&self) -> Box<dyn ResponsePublisher>;
}

#[derive(Debug, Clone)]
pub enum ResponseMessage {
    Outcome(LifecycleOutcome),
    Event { request_id: String, event: ProgressEvent },
}

/// In-process adapter backed by a channel; used for local runs and tests. A
/// Kafka-backed implementer is swappable without touching [`crate::worker_pool::WorkerPool`]
/// or [`crate::lifecycle_executor::LifecycleExecutor`].
#[derive(Clone)]
pub struct ChannelResponsePublisher {
    sender: Sender<ResponseMessage>,
}

impl ChannelResponsePublisher {
    pub fn new(sender: Sender<ResponseMessage>) -> Self {
        ChannelResponsePublisher { sender }
    }
}

impl ResponsePublisher for ChannelResponsePublisher {
    fn publish_outcome(&self, outcome: LifecycleOutcome) {
        if self.sender.send(ResponseMessage::Outcome(outcome)).is_err() {
            tracing::error!("unable to publish outcome, response channel is closed");
        }
    }

    fn publish_event(&self, request_id: &str, event: ProgressEvent) {
        if self
            .sender
            .send(ResponseMessage::Event {
                request_id: request_id.to_string(),
                event,
            })
            .is_err()
        {
            tracing::error!("unable to publish progress event, response channel is closed");
        }
    }

    fn clone_dyn(&self) -> Box<dyn ResponsePublisher> {
        Box::new(self.clone())
    }
}

/// No-op default, used where a caller (e.g. [`crate::find_executor::FindExecutor`])
/// doesn't route through the response channel at all.
#[derive(Clone, Default)]
pub struct NullResponsePublisher;

impl ResponsePublisher for NullResponsePublisher {
    fn publish_outcome(&self, _outcome: LifecycleOutcome) {}

    fn clone_dyn(&self) -> Box<dyn ResponsePublisher> {
        Box::new(self.clone())
    }
}
