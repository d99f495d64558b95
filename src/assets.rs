use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;

const SW_CONTENT: &str = include_str!("../static/sw.js");

/// Served from the origin root so the worker's scope covers every page.
pub(crate) async fn service_worker() -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "application/javascript"),
            (CACHE_CONTROL, "no-cache"),
        ],
        SW_CONTENT,
    )
}
