//! Tunnel session and request correlation
//!
//! A [`Session`] owns one tunnel: the capacity-one handoff to its sender loop, the
//! table of callers waiting for responses, and the cancellation signal that fires
//! when the tunnel starts tearing down.

use myrok_proto::{new_request_id, EndpointId, ProxyRequest, ProxyResponse, RequestParts};
use myrok_transport::{CLOSE_ABNORMAL, CLOSE_GOING_AWAY};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::pending_requests::PendingRequests;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake sent, pump loops running
    Active,
    /// Teardown initiated, loops stopping
    Closing,
    /// Pump finished, waiters resolved, unregistered
    Closed,
}

/// Why a session left the `Active` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Writing to the tunnel failed
    SendFailed,
    /// Reading from the tunnel failed or yielded an undecodable message
    ReceiveFailed,
    /// The tunnel client closed the connection
    PeerClosed,
    /// Explicit shutdown on the relay side
    Shutdown,
}

impl CloseReason {
    /// Close frame code sent to the tunnel client
    pub fn close_code(self) -> u16 {
        match self {
            CloseReason::Shutdown => CLOSE_GOING_AWAY,
            _ => CLOSE_ABNORMAL,
        }
    }

    /// Close frame reason sent to the tunnel client
    pub fn description(self) -> &'static str {
        match self {
            CloseReason::SendFailed => "error writing",
            CloseReason::ReceiveFailed | CloseReason::PeerClosed => "error receiving",
            CloseReason::Shutdown => "server shutting down",
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    reason: Option<CloseReason>,
}

/// One live tunnel
pub struct Session {
    endpoint_id: EndpointId,
    outbound: mpsc::Sender<ProxyRequest>,
    pending: PendingRequests,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    created_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint_id", &self.endpoint_id)
            .field("state", &self.state())
            .field("pending", &self.pending.count())
            .finish()
    }
}

/// Removes the waiter entry however `submit` exits, including when the caller
/// drops the future mid-flight
struct WaiterGuard<'a> {
    pending: &'a PendingRequests,
    request_id: String,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(&self.request_id);
    }
}

impl Session {
    /// Create a session and the receiving end of its outbound handoff
    pub(crate) fn new(endpoint_id: EndpointId) -> (Arc<Self>, mpsc::Receiver<ProxyRequest>) {
        // Capacity one: a stalled tunnel blocks the next submit instead of queuing
        let (outbound, outbound_rx) = mpsc::channel(1);

        let session = Arc::new(Self {
            endpoint_id,
            outbound,
            pending: PendingRequests::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Active,
                reason: None,
            }),
            cancel: CancellationToken::new(),
            created_at: Instant::now(),
        });

        (session, outbound_rx)
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Reason the session started closing, if it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle().reason
    }

    /// Number of callers currently waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.count()
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Resolves once the session has started tearing down
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Proxy one HTTP call through the tunnel
    ///
    /// Assigns a fresh request id, registers a waiter, hands the request to the
    /// sender loop and waits for the matching response. `timeout` bounds the whole
    /// call, including the handoff.
    pub async fn submit(
        &self,
        parts: RequestParts,
        timeout: Duration,
    ) -> Result<ProxyResponse, SessionError> {
        if !self.is_active() {
            return Err(SessionError::Terminated);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let request_id = new_request_id();
        let waiter = self.pending.register(request_id.clone());
        let _guard = WaiterGuard {
            pending: &self.pending,
            request_id: request_id.clone(),
        };

        let request = ProxyRequest::new(request_id, parts);
        debug!(
            "[{}] Submitting {} {} as {}",
            self.endpoint_id, request.method, request.path, request.uuid
        );

        let exchange = async {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SessionError::Terminated),
                sent = self.outbound.send(request) => {
                    sent.map_err(|_| SessionError::Terminated)?;
                }
            }

            tokio::select! {
                biased;
                outcome = waiter => outcome.unwrap_or(Err(SessionError::Terminated)),
                _ = self.cancel.cancelled() => Err(SessionError::Terminated),
            }
        };

        match tokio::time::timeout_at(deadline, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("[{}] Request timed out after {:?}", self.endpoint_id, timeout);
                Err(SessionError::Timeout(timeout))
            }
        }
    }

    /// Explicitly shut the session down
    ///
    /// The tunnel client receives a "going away" close frame.
    pub fn shutdown(&self) {
        self.begin_close(CloseReason::Shutdown);
    }

    /// Move from `Active` to `Closing`, failing every pending waiter
    ///
    /// Returns false if the session was already closing.
    pub(crate) fn begin_close(&self, reason: CloseReason) -> bool {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != SessionState::Active {
                return false;
            }
            lifecycle.state = SessionState::Closing;
            lifecycle.reason = Some(reason);
        }

        info!("[{}] Session closing: {:?}", self.endpoint_id, reason);
        self.cancel.cancel();

        let failed = self.pending.fail_all(SessionError::Terminated);
        if failed > 0 {
            info!(
                "[{}] Failed {} in-flight request(s) on teardown",
                self.endpoint_id, failed
            );
        }
        true
    }

    /// Mark the session terminal once both pump loops have stopped
    pub(crate) fn finish(&self) {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.reason.is_none() {
                lifecycle.reason = Some(CloseReason::PeerClosed);
            }
            lifecycle.state = SessionState::Closed;
        }
        self.cancel.cancel();
        self.pending.fail_all(SessionError::Terminated);
    }

    pub(crate) fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
