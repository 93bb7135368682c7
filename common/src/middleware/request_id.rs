//! Request ID middleware.

use axum::{
    body::Body,
    http::{header::HeaderName, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::utils::IdGenerator;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// ID of the HTTP request being served, available as an extension.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller supplied IDs are kept when they are valid header text.
fn incoming_or_new(headers: &HeaderMap) -> String {
    headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(IdGenerator::request_id)
}

/// Tags the request with an ID, runs the handler inside a span carrying it
/// and echoes it on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = incoming_or_new(req.headers());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri(),
    );
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_id_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER.clone(), HeaderValue::from_static("abc-123"));
        assert_eq!(incoming_or_new(&headers), "abc-123");
    }

    #[test]
    fn test_missing_id_is_generated() {
        assert_eq!(incoming_or_new(&HeaderMap::new()).len(), 36);
    }
}
