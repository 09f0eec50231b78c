#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds the real router over the repository's templates and static files,
//! so tests exercise the same pipeline the binary serves.

#![allow(dead_code)]

use std::path::PathBuf;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use trellis_kernel::Config;

pub use trellis_test_utils::{
    body_string, extract_cookies, get, input_value, post_form, post_json, set_cookie,
    with_cookies, with_header,
};

pub const SECRET: &str = "integration-test-secret";

fn repo_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(name)
}

/// Configuration pointing at the repository's templates and assets.
pub fn test_config() -> Config {
    Config {
        csrf_secrets: vec![SECRET.to_string()],
        static_dir: repo_dir("static"),
        templates_dir: repo_dir("templates"),
        ..Config::default()
    }
}

/// Application under test.
pub struct TestApp {
    pub router: Router,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let router = trellis_kernel::build(&config).expect("failed to build test app");
        Self { router, config }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        trellis_test_utils::send(&self.router, request).await
    }

    /// GET a page and return its body.
    pub async fn page(&self, uri: &str) -> String {
        let response = self.request(get(uri)).await;
        assert_eq!(response.status(), 200, "GET {uri}");
        body_string(response).await
    }

    /// Fetch the CSRF token embedded in a form page.
    pub async fn csrf_token(&self, uri: &str) -> String {
        let html = self.page(uri).await;
        input_value(&html, "_csrf").expect("form has no CSRF field")
    }
}
