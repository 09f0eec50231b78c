//! Static file serving with content-hash cache busting.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{Response, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tracing::warn;

use crate::assets::{AssetError, content_type, strip_hash};
use crate::error::AppError;
use crate::state::AppState;

/// Route pattern owned by the static asset handler.
pub const STATIC_ROUTE: &str = "/static/{*path}";

/// Create the static files router.
pub fn router() -> Router<AppState> {
    Router::new().route(STATIC_ROUTE, get(serve_static))
}

/// Serve a static file, hashed or plain.
///
/// `site.<hash>.css` and `site.css` both resolve to `site.css`; only a request
/// naming the current hash gets the long-lived cache header.
async fn serve_static(State(state): State<AppState>, Path(path): Path<String>) -> Response<Body> {
    let requested = path.trim_start_matches('/');
    let logical = strip_hash(requested);

    let (descriptor, bytes) = match state.assets().load(&logical).await {
        Ok(loaded) => loaded,
        Err(AssetError::NotFound(_) | AssetError::EmptyPath) => {
            return AppError::NotFound.into_response();
        }
        Err(e) => {
            warn!(path = %logical, error = ?e, "failed to read static file");
            return AppError::Internal(e.into()).into_response();
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(requested, &bytes)),
            (header::CACHE_CONTROL, descriptor.cache_control(requested)),
        ],
        bytes,
    )
        .into_response()
}
