use crate::adapters::WebPushSender;
use crate::config;
use crate::ports::PushSender;
use crate::types::push::{NotificationPayload, PushSubscription};

mod payload;
pub mod vapid;

use thiserror::Error;

pub use payload::{DEFAULT_BADGE, DEFAULT_ICON, DEFAULT_TAG, DEFAULT_TITLE, normalize};
pub(crate) use vapid::{VapidConfigStatus, load_vapid_config};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to encode notification payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Builds the web-push sender from configuration. `None` means delivery is
/// disabled and every send request fails as a configuration error.
pub fn sender_from_config(config: &config::AppConfig) -> Option<WebPushSender> {
    let vapid = match load_vapid_config(config) {
        VapidConfigStatus::Ready(vapid) => vapid,
        VapidConfigStatus::Incomplete => {
            tracing::warn!("push notifications disabled: incomplete VAPID configuration");
            return None;
        }
        VapidConfigStatus::Missing => {
            tracing::info!("push notifications disabled: no VAPID keys configured");
            return None;
        }
    };

    match WebPushSender::new(vapid) {
        Ok(sender) => Some(sender),
        Err(err) => {
            tracing::error!(error = %err, "push notifications disabled: failed to init web-push");
            None
        }
    }
}

/// Normalizes the payload and makes exactly one delivery attempt.
pub async fn deliver<S: PushSender>(
    sender: &S,
    subscription: &PushSubscription,
    notification: NotificationPayload,
) -> Result<(), DeliveryError> {
    let notification = normalize(notification);
    let payload = serde_json::to_string(&notification)?;
    sender
        .send(subscription, &payload)
        .await
        .map_err(|err| DeliveryError::Rejected(err.to_string()))?;
    tracing::info!(
        endpoint = %subscription.endpoint,
        tag = notification.tag.as_deref().unwrap_or_default(),
        "push notification delivered"
    );
    Ok(())
}
