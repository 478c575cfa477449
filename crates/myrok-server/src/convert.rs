//! Translation between HTTP messages and tunnel wire messages

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::Response,
};
use bytes::Bytes;
use myrok_proto::{Headers, ProxyResponse, RequestParts};
use tracing::warn;

use crate::error::ProxyError;

/// Framing headers are recomputed from the decoded body
const SKIPPED_RESPONSE_HEADERS: [HeaderName; 2] =
    [header::CONTENT_LENGTH, header::TRANSFER_ENCODING];

/// Build the wire request for an external call
///
/// The path is forwarded as received, endpoint id prefix and query string included.
pub fn request_parts(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> RequestParts {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    RequestParts {
        method: method.as_str().to_string(),
        path,
        headers: headers_to_wire(headers),
        body,
    }
}

pub fn headers_to_wire(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Turn a tunnel response into the HTTP response returned to the caller
pub fn into_http_response(response: ProxyResponse) -> Result<Response, ProxyError> {
    let body = response
        .body()
        .map_err(|e| ProxyError::MalformedResponse(e.to_string()))?;

    let status = StatusCode::from_u16(response.status).map_err(|_| {
        ProxyError::MalformedResponse(format!("invalid status code {}", response.status))
    })?;

    let mut http_response = Response::new(Body::from(body));
    *http_response.status_mut() = status;

    let headers = http_response.headers_mut();
    for (name, values) in response.headers.iter() {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Dropping invalid response header name {:?}", name);
            continue;
        };
        if SKIPPED_RESPONSE_HEADERS.contains(&name) {
            continue;
        }
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => warn!("Dropping invalid value for response header {}", name),
            }
        }
    }

    Ok(http_response)
}
