use super::{ApiError, ErrorResponse, MessageResponse, api_error, parse_json_body};
use crate::ports::PushSender;
use crate::push::{self, VapidConfigStatus, load_vapid_config};
use crate::state::AppState;
use crate::types::push::{NotificationPayload, PushSubscription};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicKeyResponse {
    public_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendNotificationRequest {
    #[serde(default)]
    subscription: Option<Value>,
    #[serde(default)]
    notification: Option<Value>,
}

pub(crate) async fn public_key<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    match load_vapid_config(&state.config) {
        VapidConfigStatus::Ready(vapid) => Ok(Json(PublicKeyResponse {
            public_key: vapid.public_key,
        })),
        VapidConfigStatus::Missing | VapidConfigStatus::Incomplete => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "VAPID keys not configured",
        )),
    }
}

pub(crate) async fn send_notification<S: PushSender>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: SendNotificationRequest = parse_json_body(&body).unwrap_or_default();
    let (Some(subscription), Some(notification)) = (request.subscription, request.notification)
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing subscription or notification data",
        ));
    };

    let Some(sender) = state.sender.as_ref() else {
        tracing::error!("send requested but VAPID keys are not configured");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "VAPID keys not configured",
        ));
    };

    let subscription = serde_json::from_value::<PushSubscription>(subscription)
        .ok()
        .filter(PushSubscription::is_complete)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid subscription data"))?;
    let notification = serde_json::from_value::<NotificationPayload>(notification)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid notification data"))?;

    if let Err(err) = push::deliver(sender, &subscription, notification).await {
        tracing::error!(endpoint = %subscription.endpoint, error = %err, "push delivery failed");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to send push notification",
                details: Some(err.to_string()),
            }),
        ));
    }

    Ok(Json(MessageResponse {
        message: "Push notification sent successfully",
    }))
}
