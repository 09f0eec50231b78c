#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Static asset serving: hashed URLs, cache headers, and path safety.

mod common;

use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use common::{TestApp, body_string, get};
use trellis_kernel::assets::{AssetDescriptor, CACHE_IMMUTABLE, CACHE_REVALIDATE};
use trellis_test_utils::assert;

fn site_css(app: &TestApp) -> AssetDescriptor {
    let bytes = std::fs::read(app.config.static_dir.join("css/site.css")).unwrap();
    AssetDescriptor::from_bytes("css/site.css", &bytes).unwrap()
}

#[tokio::test]
async fn pages_link_hashed_assets() {
    let app = TestApp::new();
    let css = site_css(&app);
    let html = app.page("/").await;
    assert::contains(
        &html,
        &format!(
            r#"<link rel="stylesheet" href="/static/{}" integrity="{}">"#,
            css.hashed_path, css.integrity
        ),
    );
    assert::contains(&html, r#"<script src="/static/js/site."#);
}

#[tokio::test]
async fn hashed_url_is_immutable() {
    let app = TestApp::new();
    let css = site_css(&app);
    let response = app.request(get(&format!("/static/{}", css.hashed_path))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], CACHE_IMMUTABLE);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
    assert::contains(&body_string(response).await, "font-family");
}

#[tokio::test]
async fn plain_url_must_revalidate() {
    let app = TestApp::new();
    let response = app.request(get("/static/css/site.css")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], CACHE_REVALIDATE);
}

#[tokio::test]
async fn stale_hash_serves_current_content_but_revalidates() {
    let app = TestApp::new();
    let stale = format!("/static/css/site.{}.css", "0".repeat(64));
    let response = app.request(get(&stale)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], CACHE_REVALIDATE);
}

#[tokio::test]
async fn javascript_content_type() {
    let app = TestApp::new();
    let response = app.request(get("/static/js/site.js")).await;
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/javascript"
    );
}

#[tokio::test]
async fn missing_and_escaping_paths_are_not_found() {
    let app = TestApp::new();
    for uri in [
        "/static/css/missing.css",
        "/static/css",
        "/static/../Cargo.toml",
        "/static/css/..%2F..%2FCargo.toml",
        "/static/%2e%2e/Cargo.toml",
    ] {
        let response = app.request(get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {uri}");
    }
}
