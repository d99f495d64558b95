use super::{ApiError, MessageResponse, api_error, authenticated_user, parse_json_body};
use crate::state::AppState;
use crate::types::push::{PushSubscription, StoredSubscription};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::value::RawValue;
use time::OffsetDateTime;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SaveSubscriptionRequest {
    #[serde(default)]
    subscription: Option<Box<RawValue>>,
}

pub(crate) async fn save_subscription<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: SaveSubscriptionRequest = parse_json_body(&body).unwrap_or_default();
    let subscription = request
        .subscription
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing subscription data"))?;

    let complete = serde_json::from_str::<PushSubscription>(subscription.get())
        .map(|descriptor| descriptor.is_complete())
        .unwrap_or(false);
    if !complete {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid subscription data"));
    }

    let user_id = authenticated_user(&state, &headers)?;
    // The file-backed store writes synchronously.
    let store = state.subscriptions.clone();
    let owner = user_id.clone();
    let saved = tokio::task::spawn_blocking(move || {
        store.upsert(&owner, subscription, OffsetDateTime::now_utc())
    })
    .await;
    let failure = match saved {
        Ok(Ok(_)) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(err) => Some(err.to_string()),
    };
    if let Some(error) = failure {
        tracing::error!(user_id = %user_id, error = %error, "failed to save subscription");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save subscription",
        ));
    }

    tracing::info!(user_id = %user_id, "push subscription saved");
    Ok(Json(MessageResponse {
        message: "Subscription saved successfully",
    }))
}

pub(crate) async fn my_subscription<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<StoredSubscription>, ApiError> {
    let user_id = authenticated_user(&state, &headers)?;
    match state.subscriptions.get(&user_id) {
        Ok(Some(stored)) => Ok(Json(stored)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Subscription not found")),
        Err(err) => {
            tracing::error!(user_id = %user_id, error = %err, "failed to load subscription");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load subscription",
            ))
        }
    }
}
