//! Request handlers run by the tunnel client

use async_trait::async_trait;
use myrok_proto::{Headers, ProxyRequest, ProxyResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Produces the response for one proxied request
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(ProxyRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProxyResponse> + Send + 'static,
{
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        (self)(request).await
    }
}

/// Request headers set by the HTTP client itself
const SKIPPED_REQUEST_HEADERS: [&str; 4] =
    ["host", "content-length", "connection", "transfer-encoding"];

/// Forwards proxied requests to a local HTTP service
pub struct LocalForwarder {
    client: reqwest::Client,
    base_url: String,
}

impl LocalForwarder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Local URL for a relayed path, without its endpoint id segment
    pub fn target_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, local_path(path))
    }

    async fn forward(&self, request: &ProxyRequest) -> Result<ProxyResponse, ClientError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ClientError::Upstream(e.to_string()))?;
        let body = request
            .body()
            .map_err(|e| ClientError::Upstream(e.to_string()))?;
        let url = self.target_url(&request.path);

        debug!("[{}] {} {}", request.uuid, method, url);

        let response = self
            .client
            .request(method, url)
            .headers(request_headers(&request.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Upstream(e.to_string()))?;

        Ok(ProxyResponse::new(request.uuid.clone(), status, headers, &body))
    }
}

#[async_trait]
impl RequestHandler for LocalForwarder {
    async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        match self.forward(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("[{}] {}", request.uuid, e);
                ProxyResponse::new(request.uuid, 502, Headers::new(), b"Bad Gateway")
            }
        }
    }
}

fn request_headers(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, values) in headers.iter() {
        if SKIPPED_REQUEST_HEADERS
            .iter()
            .any(|skipped| name.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                map.append(name.clone(), value);
            }
        }
    }
    map
}

/// Drop the leading endpoint id segment: `/abc/hello?x=1` becomes `/hello?x=1`
fn local_path(path: &str) -> String {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let rest = &rest[end..];
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}
