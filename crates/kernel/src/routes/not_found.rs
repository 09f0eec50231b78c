//! Site-wide 404 page.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use tracing::warn;

use crate::error::AppError;
use crate::flash::Flashes;
use crate::state::AppState;
use crate::theme::Page;

/// Handler for every request no route matches.
pub fn handler() -> MethodRouter<AppState> {
    any(render)
}

async fn render(
    State(state): State<AppState>,
    flashes: Flashes,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let page = Page::new("404.html")
        .status(StatusCode::NOT_FOUND)
        .insert("title", "Not found")
        .insert("path", uri.path());

    match state.theme().render(page, &flashes, &headers) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = ?e, "failed to render 404 page");
            AppError::NotFound.into_response()
        }
    }
}
