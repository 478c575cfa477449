//! Pending requests tracker
//!
//! Tracks HTTP requests sent down a tunnel and routes responses back to the callers
//! waiting on them. Each entry is resolved at most once: by a response, by the
//! caller giving up, or by the session failing every waiter on teardown.

use dashmap::DashMap;
use myrok_proto::{ProxyResponse, RequestId};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::SessionError;

/// Outcome delivered to a waiting caller
pub type WaiterResult = Result<ProxyResponse, SessionError>;

/// Tracks pending HTTP requests awaiting responses
#[derive(Clone)]
pub struct PendingRequests {
    /// Maps request id -> oneshot sender for the outcome
    requests: Arc<DashMap<RequestId, oneshot::Sender<WaiterResult>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Register a new pending request
    /// Returns a receiver that will receive the outcome
    pub fn register(&self, request_id: RequestId) -> oneshot::Receiver<WaiterResult> {
        let (tx, rx) = oneshot::channel();
        debug!("Registered pending request {}", request_id);
        self.requests.insert(request_id, tx);
        rx
    }

    /// Deliver a response to the request it answers
    /// Returns true if the response was delivered, false if no waiter matched
    pub fn respond(&self, response: ProxyResponse) -> bool {
        let Some((request_id, tx)) = self.requests.remove(&response.uuid) else {
            debug!(
                "No pending request {} - discarding response",
                response.uuid
            );
            return false;
        };

        debug!("Routing response for request {}", request_id);
        if tx.send(Ok(response)).is_err() {
            warn!(
                "Failed to deliver response for request {} - receiver dropped",
                request_id
            );
            return false;
        }
        true
    }

    /// Cancel a pending request (e.g., on timeout or when the caller goes away)
    pub fn cancel(&self, request_id: &str) -> bool {
        if self.requests.remove(request_id).is_some() {
            debug!("Cancelled pending request {}", request_id);
            return true;
        }
        false
    }

    /// Resolve a single pending request with `error`
    pub fn fail(&self, request_id: &str, error: SessionError) -> bool {
        match self.requests.remove(request_id) {
            Some((_, tx)) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Resolve every pending request with `error` and clear the table
    /// Returns the number of waiters that were failed
    pub fn fail_all(&self, error: SessionError) -> usize {
        let ids: Vec<RequestId> = self.requests.iter().map(|e| e.key().clone()).collect();

        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.requests.remove(&id) {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    /// Get count of pending requests
    pub fn count(&self) -> usize {
        self.requests.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myrok_proto::Headers;

    fn response(id: &str, status: u16) -> ProxyResponse {
        ProxyResponse::new(id.to_string(), status, Headers::new(), b"")
    }

    #[tokio::test]
    async fn test_register_and_respond() {
        let tracker = PendingRequests::new();

        let rx = tracker.register("req-123".to_string());
        assert_eq!(tracker.count(), 1);

        let delivered = tracker.respond(response("req-123", 200));
        assert!(delivered);
        assert_eq!(tracker.count(), 0);

        let received = rx.await.unwrap().unwrap();
        assert_eq!(received, response("req-123", 200));
    }

    #[tokio::test]
    async fn test_cancel() {
        let tracker = PendingRequests::new();

        let _rx = tracker.register("req-456".to_string());
        assert_eq!(tracker.count(), 1);

        assert!(tracker.cancel("req-456"));
        assert_eq!(tracker.count(), 0);

        // Canceling twice is a no-op
        assert!(!tracker.cancel("req-456"));
    }

    #[tokio::test]
    async fn test_respond_not_found() {
        let tracker = PendingRequests::new();
        assert!(!tracker.respond(response("unknown", 200)));
    }

    #[tokio::test]
    async fn test_respond_with_dropped_receiver() {
        let tracker = PendingRequests::new();

        let rx = tracker.register("req-789".to_string());
        drop(rx);

        // Should return false because receiver was dropped, entry is still removed
        assert!(!tracker.respond(response("req-789", 200)));
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_double_respond_same_request() {
        let tracker = PendingRequests::new();

        let rx = tracker.register("req-100".to_string());

        assert!(tracker.respond(response("req-100", 200)));
        assert_eq!(rx.await.unwrap().unwrap().status, 200);

        // Second response is discarded (request already resolved)
        assert!(!tracker.respond(response("req-100", 500)));
    }

    #[tokio::test]
    async fn test_respond_after_cancel_is_discarded() {
        let tracker = PendingRequests::new();

        let rx = tracker.register("req-42".to_string());
        tracker.cancel("req-42");

        assert!(!tracker.respond(response("req-42", 200)));
        // rx never receives anything
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let tracker = PendingRequests::new();

        let receivers: Vec<_> = (1..=5)
            .map(|i| tracker.register(format!("req-{}", i)))
            .collect();
        assert_eq!(tracker.count(), 5);

        assert_eq!(tracker.fail_all(SessionError::Terminated), 5);
        assert_eq!(tracker.count(), 0);

        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(SessionError::Terminated));
        }

        // Nothing left to fail
        assert_eq!(tracker.fail_all(SessionError::Terminated), 0);
    }

    #[tokio::test]
    async fn test_concurrent_register_and_respond() {
        let tracker = PendingRequests::new();

        let mut handles = vec![];
        for i in 1..=20 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("req-{}", i);
                let rx = tracker.register(id.clone());

                tokio::time::sleep(std::time::Duration::from_millis(1)).await;

                tracker.respond(response(&id, 200 + i));
                rx.await.unwrap().unwrap()
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let received = handle.await.unwrap();
            assert_eq!(received.status, 201 + i as u16);
        }

        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_clone_tracker() {
        let tracker = PendingRequests::new();
        let tracker_clone = tracker.clone();

        let rx = tracker.register("req-1".to_string());
        assert_eq!(tracker_clone.count(), 1);

        // Respond through clone, receive through original receiver
        tracker_clone.respond(response("req-1", 204));
        assert_eq!(rx.await.unwrap().unwrap().status, 204);
        assert_eq!(tracker.count(), 0);
    }
}
