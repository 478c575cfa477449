//! Transport pump: the sender and receiver loops of one session

use myrok_proto::{MessageCodec, ProxyRequest, ProxyResponse};
use myrok_transport::{TunnelSink, TunnelSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::session::{CloseReason, Session};

/// Run both loops until the session tears down
pub(crate) async fn run<S, R>(
    session: Arc<Session>,
    outbound: mpsc::Receiver<ProxyRequest>,
    sink: S,
    source: R,
    close_timeout: Duration,
) where
    S: TunnelSink,
    R: TunnelSource,
{
    let sender = tokio::spawn(sender_loop(session.clone(), outbound, sink, close_timeout));
    let receiver = tokio::spawn(receiver_loop(session.clone(), source));

    let (sender_result, receiver_result) = tokio::join!(sender, receiver);

    if let Err(e) = sender_result {
        error!("[{}] Sender loop aborted: {}", session.endpoint_id(), e);
        session.begin_close(CloseReason::SendFailed);
    }
    if let Err(e) = receiver_result {
        error!("[{}] Receiver loop aborted: {}", session.endpoint_id(), e);
        session.begin_close(CloseReason::ReceiveFailed);
    }
}

/// Drains the outbound handoff onto the tunnel, one message at a time
///
/// Owns the sending half, so it also emits the close frame once the session
/// starts tearing down, whichever side noticed the failure.
async fn sender_loop<S: TunnelSink>(
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<ProxyRequest>,
    mut sink: S,
    close_timeout: Duration,
) {
    let endpoint_id = session.endpoint_id().to_string();

    loop {
        let request = tokio::select! {
            biased;
            _ = session.terminated() => break,
            next = outbound.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };

        let text = match MessageCodec::encode(&request) {
            Ok(text) => text,
            Err(e) => {
                warn!("[{}] Dropping request {}: {}", endpoint_id, request.uuid, e);
                session.pending().fail(&request.uuid, SessionError::Encode(e.to_string()));
                continue;
            }
        };

        debug!(
            "[{}] request: {} {} ({})",
            endpoint_id, request.method, request.path, request.uuid
        );

        // A stalled write must not hold up teardown started by the receiver
        let written = tokio::select! {
            biased;
            _ = session.terminated() => break,
            written = sink.send_text(text) => written,
        };
        if let Err(e) = written {
            error!("[{}] write: {}", endpoint_id, e);
            session.begin_close(CloseReason::SendFailed);
            break;
        }
    }

    // Nothing more will be sent; make sure the session is closing before the frame goes out
    session.begin_close(CloseReason::PeerClosed);
    let reason = session.close_reason().unwrap_or(CloseReason::PeerClosed);

    match tokio::time::timeout(
        close_timeout,
        sink.close(reason.close_code(), reason.description()),
    )
    .await
    {
        Ok(Ok(())) => debug!("[{}] Close frame sent", endpoint_id),
        Ok(Err(e)) => debug!("[{}] Close frame not delivered: {}", endpoint_id, e),
        Err(_) => warn!(
            "[{}] Close frame not delivered within {:?}",
            endpoint_id, close_timeout
        ),
    }

    debug!("[{}] Sender loop ended", endpoint_id);
}

/// Reads responses off the tunnel and hands each one to its waiter
async fn receiver_loop<R: TunnelSource>(session: Arc<Session>, mut source: R) {
    let endpoint_id = session.endpoint_id().to_string();

    loop {
        let frame = tokio::select! {
            biased;
            _ = session.terminated() => break,
            frame = source.recv() => frame,
        };

        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!("[{}] Tunnel closed by client", endpoint_id);
                session.begin_close(CloseReason::PeerClosed);
                break;
            }
            Err(e) => {
                error!("[{}] recv: {}", endpoint_id, e);
                session.begin_close(CloseReason::ReceiveFailed);
                break;
            }
        };

        let response = match MessageCodec::decode::<ProxyResponse>(&payload) {
            Ok(response) => response,
            Err(e) => {
                error!("[{}] recv: undecodable message: {}", endpoint_id, e);
                session.begin_close(CloseReason::ReceiveFailed);
                break;
            }
        };

        debug!(
            "[{}] response: {} for {}",
            endpoint_id, response.status, response.uuid
        );
        session.pending().respond(response);
    }

    debug!("[{}] Receiver loop ended", endpoint_id);
}
