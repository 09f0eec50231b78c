//! Security response headers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{CONTENT_SECURITY_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Default Content-Security-Policy.
pub const DEFAULT_CSP: &str = "default-src 'self'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOptions {
    Deny,
    SameOrigin,
}

impl FrameOptions {
    fn as_str(self) -> &'static str {
        match self {
            FrameOptions::Deny => "DENY",
            FrameOptions::SameOrigin => "SAMEORIGIN",
        }
    }
}

impl std::str::FromStr for FrameOptions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DENY" => Ok(FrameOptions::Deny),
            "SAMEORIGIN" => Ok(FrameOptions::SameOrigin),
            other => Err(format!("unknown X-Frame-Options value `{other}`")),
        }
    }
}

/// Which security headers to send. Each one is independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeaders {
    pub frame_options: Option<FrameOptions>,
    pub nosniff: bool,
    pub content_security_policy: Option<String>,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self {
            frame_options: Some(FrameOptions::Deny),
            nosniff: true,
            content_security_policy: Some(DEFAULT_CSP.to_string()),
        }
    }
}

impl SecurityHeaders {
    /// Send none of the headers.
    pub fn disabled() -> Self {
        Self {
            frame_options: None,
            nosniff: false,
            content_security_policy: None,
        }
    }
}

/// Add the configured headers unless the handler already set them.
pub async fn apply_security_headers(
    State(config): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    if let Some(frame) = config.frame_options {
        headers
            .entry(X_FRAME_OPTIONS)
            .or_insert(HeaderValue::from_static(frame.as_str()));
    }
    if config.nosniff {
        headers
            .entry(X_CONTENT_TYPE_OPTIONS)
            .or_insert(HeaderValue::from_static("nosniff"));
    }
    if let Some(csp) = &config.content_security_policy {
        match HeaderValue::from_str(csp) {
            Ok(value) => {
                headers.entry(CONTENT_SECURITY_POLICY).or_insert(value);
            }
            Err(e) => tracing::warn!(error = %e, "invalid Content-Security-Policy value"),
        }
    }

    response
}
