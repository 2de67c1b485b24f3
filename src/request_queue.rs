//! Inbound work abstraction: the durable request queue the core consumes
//! from. The concrete transport (Kafka) is an external collaborator; this
//! trait is the only contract in scope.

use crate::request::LifecycleRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

pub trait RequestQueue: Send + Sync {
    /// Blocks until a request is available or the queue is closed. When a
    /// request arrives, invokes `handler` with it and only then considers
    /// delivery acknowledged. Returns `false` once the queue is closed and
    /// will never yield another request.
    fn next(&self, handler: &mut dyn FnMut(LifecycleRequest)) -> bool;

    /// Unblocks every `next` call currently waiting. Idempotent.
    fn close(&self);
}

/// In-process adapter backed by a channel; used for local runs and tests.
pub struct ChannelRequestQueue {
    receiver: Mutex<Receiver<Option<LifecycleRequest>>>,
    sender: Sender<Option<LifecycleRequest>>,
    closed: AtomicBool,
}

impl ChannelRequestQueue {
    pub fn new() -> (Self, Sender<Option<LifecycleRequest>>) {
        let (sender, receiver) = std::sync::mpsc::channel();
        (
            ChannelRequestQueue {
                receiver: Mutex::new(receiver),
                sender: sender.clone(),
                closed: AtomicBool::new(false),
            },
            sender,
        )
    }
}

impl RequestQueue for ChannelRequestQueue {
    fn next(&self, handler: &mut dyn FnMut(LifecycleRequest)) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let received = {
            let receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
            receiver.recv()
        };

        match received {
            Ok(Some(request)) => {
                handler(request);
                true
            }
            Ok(None) | Err(_) => {
                self.closed.store(true, Ordering::Release);
                false
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // wake up a blocked `next` even if no producer ever sends again
        let _ = self.sender.send(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver_files::DriverFiles;
    use crate::properties::PropertyBag;
    use crate::request::DeploymentLocationSpec;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    fn dummy_request(id: &str) -> LifecycleRequest {
        LifecycleRequest {
            request_id: id.to_string(),
            lifecycle_name: "install".to_string(),
            driver_files: DriverFiles::new("/tmp/doesnotmatter"),
            resource_properties: PropertyBag::new(),
            system_properties: PropertyBag::new(),
            request_properties: PropertyBag::new(),
            deployment_location: DeploymentLocationSpec {
                name: "loc".to_string(),
                location_type: "Generic".to_string(),
                properties: PropertyBag::new(),
            },
            associated_topology: crate::request::TopologyMap::new(),
            keep_files: false,
            logging_context: BTreeMap::new(),
        }
    }

    #[test]
    fn delivers_requests_in_order_then_unblocks_on_close() {
        let (queue, sender) = ChannelRequestQueue::new();
        let queue = Arc::new(queue);

        sender.send(Some(dummy_request("a"))).unwrap();
        sender.send(Some(dummy_request("b"))).unwrap();

        let mut seen = Vec::new();
        assert!(queue.next(&mut |r| seen.push(r.request_id)));
        assert!(queue.next(&mut |r| seen.push(r.request_id)));
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);

        let queue_for_thread = queue.clone();
        let handle = thread::spawn(move || queue_for_thread.next(&mut |_| {}));
        queue.close();
        assert!(!handle.join().unwrap());
    }
}
