#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Router and middleware pipeline tests.

mod common;

use axum::http::StatusCode;
use axum::http::header::{
    CONTENT_SECURITY_POLICY, ETAG, LOCATION, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::routing::get as get_route;
use common::{TestApp, body_string, get, post_form, test_config, with_header};
use trellis_kernel::middleware::SecurityHeaders;
use trellis_kernel::routes::{RouteError, Routes, not_found};
use trellis_kernel::{App, AppState};
use trellis_test_utils::assert;

#[tokio::test]
async fn home_page_renders() {
    let app = TestApp::new();
    let html = app.page("/").await;
    assert::contains(&html, "<h1>Trellis</h1>");
    assert::contains(&html, "See upcoming events");
    // route links come out as plain paths
    assert::contains(&html, r#"<a href="/events">Events</a>"#);
    assert::not_contains(&html, "&#x2F;");
}

#[tokio::test]
async fn unknown_paths_get_the_site_404() {
    let app = TestApp::new();
    for uri in ["/unknown", "/events/extra/deep", "/index.html"] {
        let response = app.request(get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "GET {uri}");
        assert::contains(&body_string(response).await, "Page not found");
    }
}

#[tokio::test]
async fn unknown_post_gets_the_site_404() {
    let app = TestApp::new();
    let response = app.request(post_form("/nowhere", &[("a", "b")])).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert::contains(&body_string(response).await, "Page not found");
}

#[tokio::test]
async fn missing_event_is_not_found() {
    let app = TestApp::new();
    let response = app.request(get("/events/does-not-exist/edit")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn route_under_static_prefix_is_rejected() {
    let routes = Routes::new().route("assets", "/static/override.css", get_route(|| async { "" }));
    let state = AppState::new(&test_config(), routes.names()).unwrap();
    let err = App::new(routes)
        .not_found(not_found::handler())
        .into_router(state)
        .unwrap_err();
    assert!(matches!(err, RouteError::ReservedPath { .. }));
}

#[test]
fn duplicate_path_is_rejected() {
    let routes = Routes::new()
        .route("a", "/same", get_route(|| async { "a" }))
        .route("b", "/same", get_route(|| async { "b" }));
    let state = AppState::new(&test_config(), routes.names()).unwrap();
    assert!(matches!(
        App::new(routes).into_router(state),
        Err(RouteError::DuplicatePath { .. })
    ));
}

#[tokio::test]
async fn without_custom_404_unknown_paths_are_plain_404() {
    let routes = Routes::new().route("ping", "/ping", get_route(|| async { "pong" }));
    let state = AppState::new(&test_config(), routes.names()).unwrap();
    let router = App::new(routes).into_router(state).unwrap();

    let response = trellis_test_utils::send(&router, get("/ping")).await;
    assert_eq!(body_string(response).await, "pong");
    let response = trellis_test_utils::send(&router, get("/")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new();
    let response = app.request(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn security_headers_are_set() {
    let app = TestApp::new();
    for uri in ["/", "/unknown", "/health"] {
        let response = app.request(get(uri)).await;
        let headers = response.headers();
        assert_eq!(headers[X_FRAME_OPTIONS], "DENY", "{uri}");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff", "{uri}");
        assert_eq!(headers[CONTENT_SECURITY_POLICY], "default-src 'self'", "{uri}");
    }
}

#[tokio::test]
async fn security_headers_can_be_turned_off() {
    let mut config = test_config();
    config.security = SecurityHeaders::disabled();
    let app = TestApp::with_config(config);
    let response = app.request(get("/")).await;
    assert!(!response.headers().contains_key(X_FRAME_OPTIONS));
    assert!(!response.headers().contains_key(X_CONTENT_TYPE_OPTIONS));
    assert!(!response.headers().contains_key(CONTENT_SECURITY_POLICY));
}

#[tokio::test]
async fn request_id_is_generated_or_echoed() {
    let app = TestApp::new();
    let response = app.request(get("/")).await;
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let response = app
        .request(with_header(get("/"), "x-request-id", "abc-123"))
        .await;
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn other_hosts_redirect_to_base_url() {
    let mut config = test_config();
    config.base_url = Some("https://events.example.com".to_string());
    let app = TestApp::with_config(config);

    let response = app
        .request(with_header(get("/events?page=2"), "host", "old.example.com"))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[LOCATION],
        "https://events.example.com/events?page=2"
    );

    let response = app
        .request(with_header(get("/events"), "host", "events.example.com"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // the CDN's original host wins over Host
    let response = app.request(with_header(
        with_header(get("/"), "host", "events.example.com"),
        "x-original-host",
        "cdn-alias.example.net",
    ))
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn unchanged_page_is_not_modified() {
    let app = TestApp::new();
    let first = app.request(get("/")).await;
    let etag = first.headers()[ETAG].to_str().unwrap().to_string();

    let response = app
        .request(with_header(get("/"), "if-none-match", &etag))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_string(response).await.is_empty());
}
