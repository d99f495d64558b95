use super::{ApiError, api_error, authenticated_user};
use crate::ports::PushSender;
use crate::state::AppState;
use crate::types::orders::OrderChange;
use crate::watcher::WatcherStatus;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use time::OffsetDateTime;

const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";
const ORDERS_TABLE: &str = "orders";

#[derive(Debug, Serialize)]
pub(crate) struct IngestResponse {
    delivered: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViewedResponse {
    unread: u32,
}

/// Database webhook for row changes on `orders`.
pub(crate) async fn ingest_order_change<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(secret) {
            tracing::warn!("order webhook rejected: bad secret");
            return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    let change: OrderChange = serde_json::from_slice(&body).map_err(|err| {
        tracing::debug!(error = %err, "malformed order change");
        api_error(StatusCode::BAD_REQUEST, "Invalid order change")
    })?;

    if change.table.as_deref().is_some_and(|table| table != ORDERS_TABLE) {
        tracing::debug!(table = ?change.table, "ignoring change for another table");
        return Ok((StatusCode::ACCEPTED, Json(IngestResponse { delivered: 0 })));
    }

    let delivered = state.orders.publish(change);
    Ok((StatusCode::ACCEPTED, Json(IngestResponse { delivered })))
}

/// Starts the caller's order watcher on first use and reports its state.
/// Pending toasts are handed out once. Polling keeps the watcher alive.
pub(crate) async fn vendor_notifications<S: PushSender>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<WatcherStatus>, ApiError> {
    let vendor_id = authenticated_user(&state, &headers)?;
    let status = state
        .watchers
        .poll(&vendor_id, OffsetDateTime::now_utc(), || {
            state.watcher.start(&vendor_id)
        });
    Ok(Json(status))
}

pub(crate) async fn mark_orders_viewed<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<ViewedResponse>, ApiError> {
    let vendor_id = authenticated_user(&state, &headers)?;
    state
        .watchers
        .mark_orders_viewed(&vendor_id, OffsetDateTime::now_utc());
    Ok(Json(ViewedResponse { unread: 0 }))
}

pub(crate) async fn stop_vendor_notifications<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let vendor_id = authenticated_user(&state, &headers)?;
    state.watchers.stop(&vendor_id);
    Ok(StatusCode::NO_CONTENT)
}
