//! Front page.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use crate::error::AppResult;
use crate::flash::Flashes;
use crate::state::AppState;
use crate::theme::Page;

pub async fn index(
    State(state): State<AppState>,
    flashes: Flashes,
    headers: HeaderMap,
) -> AppResult<Response> {
    state
        .theme()
        .render(Page::new("home.html").insert("title", "Home"), &flashes, &headers)
}
