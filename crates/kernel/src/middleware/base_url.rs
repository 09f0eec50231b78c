//! Canonical host redirect.
//!
//! Requests arriving under any host other than the configured base URL's are
//! redirected there with path and query preserved. Behind a CDN the edge sets
//! `X-Original-Host`, which takes precedence over `Host`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use url::Url;

/// Header set by the CDN edge with the host the client asked for.
pub const ORIGINAL_HOST_HEADER: &str = "x-original-host";

/// Canonical base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    url: Url,
    authority: String,
}

impl BaseUrl {
    pub fn new(url: Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Self { url, authority }
    }

    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input).map(Self::new)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host[:port]` as it must appear in the request.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The canonical URL for a request path and query.
    pub fn target(&self, path: &str, query: Option<&str>) -> String {
        let mut url = self.url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url.set_query(query);
        url.to_string()
    }
}

fn effective_host(request: &Request) -> Option<&str> {
    let headers = request.headers();
    headers
        .get(ORIGINAL_HOST_HEADER)
        .or_else(|| headers.get(HOST))
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
}

/// Redirect (307) to the canonical host when the request's host differs.
pub async fn canonicalize_host(
    State(base): State<Arc<BaseUrl>>,
    request: Request,
    next: Next,
) -> Response {
    let host = effective_host(&request).unwrap_or_default();
    if host.eq_ignore_ascii_case(base.authority()) {
        return next.run(request).await;
    }

    let target = base.target(request.uri().path(), request.uri().query());
    tracing::debug!(host = %host, target = %target, "redirecting to canonical host");
    Redirect::temporary(&target).into_response()
}
