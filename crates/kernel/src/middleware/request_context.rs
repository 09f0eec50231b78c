//! Per-request logging context and access log.
//!
//! The request id is assigned by `SetRequestIdLayer` before these run, so the
//! span and the [`RequestContext`] extension see the same id.

use std::time::Duration;

use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Span, info, info_span};

/// Header carrying the request id.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request-scoped values available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Span for one request, carrying the enrichment fields.
pub fn request_span(request: &Request) -> Span {
    let headers = request.headers();
    info_span!(
        "request",
        method = %request.method(),
        url = %request.uri(),
        referer = header_str(headers, &REFERER),
        request_id = header_str(headers, &REQUEST_ID_HEADER),
        user_agent = header_str(headers, &USER_AGENT),
    )
}

/// Access log line, emitted inside the request span.
pub fn log_response(response: &Response, latency: Duration, _span: &Span) {
    let size = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    info!(
        status = response.status().as_u16(),
        size,
        latency_ms = latency.as_secs_f64() * 1000.0,
        "request completed"
    );
}

/// Make the request id available to handlers.
pub async fn inject_request_context(mut request: Request, next: Next) -> Response {
    let request_id = header_str(request.headers(), &REQUEST_ID_HEADER).to_string();
    request
        .extensions_mut()
        .insert(RequestContext { request_id });
    next.run(request).await
}
