//! CSRF enforcement for handlers that do not parse a form schema
//! (JSON endpoints, AJAX callers, plain urlencoded posts).

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::Method;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::form::{CsrfSigner, FormValues, MAX_FORM_BYTES, token_from_request};

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_urlencoded(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Reject unsafe requests that carry no valid token with 403.
pub async fn require_csrf(
    State(signer): State<Arc<CsrfSigner>>,
    request: Request,
    next: Next,
) -> Response {
    if is_safe(request.method()) {
        return next.run(request).await;
    }

    // The form value can only be read from the body; buffer it and put it back.
    let (request, form) = if is_urlencoded(&request) {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return AppError::BadRequest("request body too large".to_string()).into_response();
            }
        };
        let form = FormValues::from_urlencoded(&bytes);
        (Request::from_parts(parts, Body::from(bytes)), Some(form))
    } else {
        (request, None)
    };

    let token = token_from_request(form.as_ref(), request.uri(), request.headers());
    match signer.validate(token.as_deref().unwrap_or_default()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "CSRF check failed");
            AppError::Forbidden.into_response()
        }
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::post;
    use tower::ServiceExt;

    fn signer() -> Arc<CsrfSigner> {
        Arc::new(CsrfSigner::new(["s"], Duration::ZERO).unwrap())
    }

    fn app(signer: Arc<CsrfSigner>) -> Router {
        Router::new()
            .route(
                "/submit",
                post(|values: FormValues| async move {
                    values.get("title").unwrap_or_default().to_string()
                })
                .get(|| async { "form" }),
            )
            .layer(from_fn_with_state(signer, require_csrf))
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn safe_methods_pass() {
        let response = app(signer())
            .oneshot(Request::builder().uri("/submit").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn form_token_is_accepted_and_body_restored() {
        let signer = signer();
        let token = signer.generate();
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("title", "Hello")
            .append_pair("_csrf", &token)
            .finish();
        let response = app(signer)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/submit")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(form))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "Hello");
    }

    #[tokio::test]
    async fn header_token_is_accepted() {
        let signer = signer();
        let token = signer.generate();
        let response = app(signer)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/submit")
                    .header("x-csrf-token", token)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_forged_token_is_forbidden() {
        for token in [None, Some("2024-01-01T00:00:00Z.AAAA")] {
            let mut builder = Request::builder().method(Method::POST).uri("/submit");
            if let Some(token) = token {
                builder = builder.header("x-xsrf-token", token);
            }
            let response = app(signer())
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }
}
