//! HTTP basic authentication for individual routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;

type CheckFn = dyn Fn(&str, &str) -> bool + Send + Sync;

/// Credential check for [`require_basic_auth`].
#[derive(Clone)]
pub struct BasicAuth {
    check: Arc<CheckFn>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BasicAuth(..)")
    }
}

/// Accept exactly one username/password pair.
pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> BasicAuth {
    let username = username.into();
    let password = password.into();
    basic_auth_with(move |u, p| {
        // evaluate both so timing does not reveal which one was wrong
        let user_ok = u.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = p.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    })
}

/// Accept credentials for which `check` returns true.
pub fn basic_auth_with<F>(check: F) -> BasicAuth
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    BasicAuth {
        check: Arc::new(check),
    }
}

impl BasicAuth {
    pub fn verify(&self, headers: &HeaderMap) -> bool {
        credentials(headers).is_some_and(|(user, pass)| (self.check)(&user, &pass))
    }
}

fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Answer 401 with a `WWW-Authenticate` challenge unless credentials pass.
pub async fn require_basic_auth(
    State(auth): State<BasicAuth>,
    request: Request,
    next: Next,
) -> Response {
    if auth.verify(request.headers()) {
        return next.run(request).await;
    }
    tracing::debug!(path = %request.uri().path(), "basic auth rejected");
    (
        StatusCode::UNAUTHORIZED,
        [(
            WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"Restricted\""),
        )],
        "unauthorized",
    )
        .into_response()
}
