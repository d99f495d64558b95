use crate::types::push::NotificationPayload;

pub const DEFAULT_TITLE: &str = "UMKM Market";
pub const DEFAULT_ICON: &str = "/android-chrome-192x192.png";
pub const DEFAULT_BADGE: &str = "/android-chrome-192x192.png";
pub const DEFAULT_TAG: &str = "default-tag";

/// Fills in presentation defaults and pins `requireInteraction` so the
/// notification stays until the user dismisses it.
pub fn normalize(mut payload: NotificationPayload) -> NotificationPayload {
    payload.title = Some(non_blank(payload.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()));
    payload.icon = Some(non_blank(payload.icon).unwrap_or_else(|| DEFAULT_ICON.to_string()));
    payload.badge = Some(non_blank(payload.badge).unwrap_or_else(|| DEFAULT_BADGE.to_string()));
    payload.tag = Some(non_blank(payload.tag).unwrap_or_else(|| DEFAULT_TAG.to_string()));
    payload.require_interaction = true;
    payload
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
