//! HTTP handlers: tunnel upgrade and request forwarding

use axum::{
    body::Bytes,
    extract::{
        rejection::BytesRejection,
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::convert::{into_http_response, request_parts};
use crate::error::ProxyError;
use crate::websocket;
use crate::AppState;

/// `GET /proxy`: upgrade to a tunnel connection
pub async fn tunnel_upgrade(
    State(state): State<Arc<AppState>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            return ProxyError::UpgradeFailure(rejection.body_text()).into_response();
        }
    };

    upgrade
        .on_failed_upgrade(|e| warn!("Tunnel upgrade failed: {}", e))
        .on_upgrade(move |socket| {
            let tasks = state.tunnel_tasks.clone();
            tasks.track_future(async move {
                let (sink, source) = websocket::split(socket);
                if let Err(e) = state.tunnels.handle_tunnel(sink, source).await {
                    error!("Tunnel terminated before serving: {}", e);
                }
            })
        })
}

/// `ANY /{endpoint_id}/{path...}`: forward the call down the matching tunnel
pub async fn forward(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ProxyError> {
    let endpoint_id = endpoint_id(uri.path());

    let session = state
        .tunnels
        .registry()
        .lookup(endpoint_id)
        .ok_or_else(|| ProxyError::UnknownEndpoint(endpoint_id.to_string()))?;

    let body = body.map_err(|e| ProxyError::InvalidRequestBody(e.body_text()))?;

    debug!("[{}] {} {}", endpoint_id, method, uri);
    let parts = request_parts(&method, &uri, &headers, body);
    let response = session
        .submit(parts, state.tunnels.config().request_timeout)
        .await?;

    into_http_response(response)
}

/// First path segment, which names the tunnel
fn endpoint_id(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    match path.find('/') {
        Some(i) => &path[..i],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_id() {
        assert_eq!(endpoint_id("/abc123/hello"), "abc123");
        assert_eq!(endpoint_id("/abc123/a/b/c"), "abc123");
        assert_eq!(endpoint_id("/abc123"), "abc123");
        assert_eq!(endpoint_id("/abc123/"), "abc123");
        assert_eq!(endpoint_id("/"), "");
    }
}
