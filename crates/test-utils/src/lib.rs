//! Trellis test utilities.
//!
//! Helpers for integration testing: request builders, response readers,
//! cookie handling, and temporary directory fixtures.

use std::fs;
use std::path::Path;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

/// Send a request through a router.
///
/// # Panics
///
/// Panics if the router's service fails, which axum routers never do.
pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|e| panic!("router failed: {e}"))
}

/// A GET request.
pub fn get(uri: &str) -> Request<Body> {
    request("GET", uri, Body::empty())
}

/// A urlencoded POST request.
pub fn post_form(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let mut request = request("POST", uri, Body::from(body));
    request.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    request
}

/// A JSON POST request.
pub fn post_json(uri: &str, json: &str) -> Request<Body> {
    let mut request = request("POST", uri, Body::from(json.to_string()));
    request.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    request
}

fn request(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap_or_else(|e| panic!("invalid request {method} {uri}: {e}"))
}

/// Add a header to a request.
pub fn with_header(mut request: Request<Body>, name: &'static str, value: &str) -> Request<Body> {
    let value = value
        .parse::<header::HeaderValue>()
        .unwrap_or_else(|e| panic!("invalid value for {name}: {e}"));
    request.headers_mut().insert(name, value);
    request
}

/// Attach cookies (as produced by [`extract_cookies`]) to a request.
pub fn with_cookies(request: Request<Body>, cookies: &str) -> Request<Body> {
    if cookies.is_empty() {
        return request;
    }
    with_header(request, "cookie", cookies)
}

/// Read the whole response body as UTF-8.
pub async fn body_string(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap_or_else(|e| panic!("failed to read body: {e}"))
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extract Set-Cookie headers from a response for use in subsequent requests.
///
/// Removal cookies (`Max-Age=0`) are skipped.
pub fn extract_cookies(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|cookie| !cookie.contains("Max-Age=0"))
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The full Set-Cookie header for `name`, if the response sets it.
pub fn set_cookie<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|cookie| cookie.starts_with(&prefix))
}

/// The `value` attribute of the first input named `name` in an HTML page.
pub fn input_value(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let start = html.find(&marker)? + marker.len();
    let tag_end = html[start..].find('>')? + start;
    let tag = &html[start..tag_end];
    let value_start = tag.find("value=\"")? + "value=\"".len();
    let value_len = tag[value_start..].find('"')?;
    Some(tag[value_start..value_start + value_len].to_string())
}

/// A temporary directory tree that is removed on drop.
pub struct TempTree {
    dir: TempDir,
}

impl TempTree {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}")),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics on I/O failure.
    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> &Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("failed to create {}: {e}", parent.display()));
        }
        fs::write(&path, contents)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
        self
    }
}

impl Default for TempTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Assertion helpers.
pub mod assert {
    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string not to contain '{needle}'\nActual: {haystack}"
        );
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn finds_input_values() {
        let html = r#"<form><input type="text" name="title" value="Hi">
            <input type="hidden" name="_csrf" value="2024-01-01T00:00:00Z.abc="></form>"#;
        assert_eq!(input_value(html, "title").unwrap(), "Hi");
        assert_eq!(
            input_value(html, "_csrf").unwrap(),
            "2024-01-01T00:00:00Z.abc="
        );
        assert!(input_value(html, "missing").is_none());
    }

    #[test]
    fn post_form_encodes_pairs() {
        let request = post_form("/x", &[("a", "b c")]);
        assert_eq!(
            request.headers()[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn temp_tree_writes_nested_files() {
        let tree = TempTree::new();
        tree.write("css/site.css", "body{}");
        assert_eq!(
            fs::read_to_string(tree.path().join("css/site.css")).unwrap(),
            "body{}"
        );
    }
}
