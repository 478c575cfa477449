//! Tunnel client tests
//!
//! The relay side is played by the in-memory transport peer, and a small axum app
//! stands in for the local service.

use axum::{body::Bytes, http::HeaderMap, routing::post, Router};
use myrok_client::{ClientConfig, ClientError, ConnectedTunnel, LocalForwarder};
use myrok_proto::{Handshake, Headers, ProxyRequest, ProxyResponse, RequestParts};
use myrok_transport::{channel_pair, MemoryFrame, MemoryPeer, MemorySink, MemorySource};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn config() -> ClientConfig {
    ClientConfig {
        server_url: "http://relay.test".to_string(),
        ..Default::default()
    }
}

async fn connected() -> (ConnectedTunnel<MemorySink, MemorySource>, MemoryPeer) {
    let (sink, source, peer) = channel_pair();
    let handshake = Handshake {
        endpoint: "abc123".to_string(),
    };
    peer.sender().send(serde_json::to_string(&handshake).unwrap());

    let tunnel = ConnectedTunnel::handshake(sink, source, &config())
        .await
        .unwrap();
    (tunnel, peer)
}

fn request(uuid: &str, path: &str) -> String {
    let parts = RequestParts {
        method: "GET".to_string(),
        path: path.to_string(),
        ..Default::default()
    };
    serde_json::to_string(&ProxyRequest::new(uuid.to_string(), parts)).unwrap()
}

async fn next_response(peer: &mut MemoryPeer) -> ProxyResponse {
    let text = timeout(Duration::from_secs(5), peer.next_text())
        .await
        .unwrap()
        .expect("response frame");
    serde_json::from_str(&text).unwrap()
}

async fn echo_path(request: ProxyRequest) -> ProxyResponse {
    let body = request.path.clone();
    ProxyResponse::new(request.uuid, 200, Headers::new(), body.as_bytes())
}

#[tokio::test]
async fn test_handshake_sets_public_url() {
    let (tunnel, _peer) = connected().await;

    assert_eq!(tunnel.endpoint(), "abc123");
    assert_eq!(tunnel.public_url(), "http://relay.test/abc123");
}

#[tokio::test]
async fn test_handshake_rejects_garbage() {
    let (sink, source, peer) = channel_pair();
    peer.sender().send("not json");

    let result = ConnectedTunnel::handshake(sink, source, &config()).await;

    assert!(matches!(result, Err(ClientError::Handshake(_))));
}

#[tokio::test]
async fn test_handshake_on_closed_connection() {
    let (sink, source, peer) = channel_pair();
    drop(peer);

    let result = ConnectedTunnel::handshake(sink, source, &config()).await;

    assert!(matches!(result, Err(ClientError::Handshake(_))));
}

#[tokio::test]
async fn test_requests_are_answered() {
    let (tunnel, mut peer) = connected().await;
    let sender = peer.sender();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        tunnel
            .run_until(echo_path, async {
                let _ = stop_rx.await;
            })
            .await
    });

    sender.send(request("r1", "/abc123/one"));
    let response = next_response(&mut peer).await;
    assert_eq!(response.uuid, "r1");
    assert_eq!(response.status, 200);
    assert_eq!(response.body().unwrap(), b"/abc123/one");

    // An undecodable message is skipped; the tunnel keeps serving
    sender.send("{\"bogus\":true}");
    sender.send(request("r2", "/abc123/two"));
    let response = next_response(&mut peer).await;
    assert_eq!(response.uuid, "r2");

    stop_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    match peer.next_frame().await {
        Some(MemoryFrame::Close { code, .. }) => assert_eq!(code, 1000),
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_request_does_not_block_others() {
    let (tunnel, mut peer) = connected().await;
    let sender = peer.sender();

    let handler = |request: ProxyRequest| async move {
        if request.path.ends_with("/slow") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        ProxyResponse::new(request.uuid, 200, Headers::new(), b"")
    };
    let _task = tokio::spawn(tunnel.run(handler));

    sender.send(request("slow", "/abc123/slow"));
    sender.send(request("fast", "/abc123/fast"));

    assert_eq!(next_response(&mut peer).await.uuid, "fast");
    assert_eq!(next_response(&mut peer).await.uuid, "slow");
}

#[tokio::test]
async fn test_relay_close_ends_run() {
    let (tunnel, peer) = connected().await;
    let task = tokio::spawn(tunnel.run(echo_path));

    drop(peer);

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_transport_failure_is_reported() {
    let (tunnel, peer) = connected().await;
    let sender = peer.sender();
    let task = tokio::spawn(tunnel.run(echo_path));

    sender.fail("connection reset");

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_local_forwarder_reaches_local_service() {
    let app = Router::new().route(
        "/echo",
        post(|headers: HeaderMap, body: Bytes| async move {
            let tag = headers
                .get("x-tag")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            ([("x-echo-tag", tag)], body)
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let forwarder =
        LocalForwarder::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    let (tunnel, mut peer) = connected().await;
    let sender = peer.sender();
    let _task = tokio::spawn(tunnel.run(forwarder));

    let parts = RequestParts {
        method: "POST".to_string(),
        path: "/abc123/echo".to_string(),
        headers: [("x-tag", "blue")].into_iter().collect(),
        body: Bytes::from_static(b"payload"),
    };
    sender.send(serde_json::to_string(&ProxyRequest::new("r1".to_string(), parts)).unwrap());

    let response = next_response(&mut peer).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get_all("x-echo-tag"), ["blue"]);
    assert_eq!(response.body().unwrap(), b"payload");
}
