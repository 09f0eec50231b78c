//! Custom 404 handling for the root route.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::MethodRouter;
use tower::ServiceExt;

/// A 404 handler with its state already applied.
pub type NotFoundService = MethodRouter;

/// Let only the exact root path through to the wrapped route; everything
/// else is answered by the 404 handler.
pub async fn only_exact_root(
    State(not_found): State<NotFoundService>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/" {
        return next.run(request).await;
    }
    match not_found.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::response::IntoResponse;
    use axum::routing::any;

    fn not_found() -> NotFoundService {
        any(|| async { (StatusCode::NOT_FOUND, "custom 404").into_response() })
    }

    #[tokio::test]
    async fn root_passes_through() {
        let root: MethodRouter = axum::routing::get(|| async { "home" })
            .layer(from_fn_with_state(not_found(), only_exact_root));
        let response = root
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_paths_get_the_404_handler() {
        let root: MethodRouter = axum::routing::get(|| async { "home" })
            .layer(from_fn_with_state(not_found(), only_exact_root));
        let response = root
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
