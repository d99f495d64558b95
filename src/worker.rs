//! Service worker model.
//!
//! The browser drives a worker through `install` and `activate` and then
//! delivers `push`, `notificationclick` and `message` events on a single
//! thread. [`ServiceWorker`] mirrors that lifecycle as an explicit state
//! machine over a [`NotificationHost`]; the script served at `/sw.js`
//! implements the same behaviour in the browser.

use crate::ports::NotificationHost;
use crate::push::{DEFAULT_BADGE, DEFAULT_ICON, DEFAULT_TAG, DEFAULT_TITLE, normalize};
use crate::types::push::{NotificationAction, NotificationPayload, lenient};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::collections::BTreeMap;

pub const DEFAULT_VIBRATE: [u32; 3] = [100, 50, 100];
const DISMISS_ACTIONS: [&str; 2] = ["dismiss", "close"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninstalled,
    Installing,
    /// Installed and waiting for the previous worker to release its clients.
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Options handed to `registration.showNotification`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub vibrate: Vec<u32>,
    pub data: Map<String, Value>,
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl DisplayOptions {
    /// Expects a payload that went through [`normalize`].
    fn from_payload(payload: NotificationPayload) -> Self {
        Self {
            body: payload.body,
            icon: Some(payload.icon.unwrap_or_else(|| DEFAULT_ICON.to_string())),
            badge: Some(payload.badge.unwrap_or_else(|| DEFAULT_BADGE.to_string())),
            vibrate: payload
                .vibrate
                .unwrap_or_else(|| DEFAULT_VIBRATE.to_vec()),
            data: payload.data,
            actions: payload.actions,
            require_interaction: true,
            tag: Some(payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
}

/// A click on a displayed notification. `action` is empty for a click on
/// the notification body.
#[derive(Debug, Clone, Default)]
pub struct NotificationClick {
    pub action: String,
    pub tag: Option<String>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    ShowNotification {
        title: String,
        #[serde(default, deserialize_with = "lenient")]
        options: DisplayOptions,
    },
    SkipWaiting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Displayed,
    Focused(String),
    OpenedWindow(String),
    Closed,
    Activated,
    Ignored,
    Dropped,
}

/// Lifetime extensions requested by in-flight handlers, the explicit form
/// of `event.waitUntil`. The runtime may only suspend the worker when no
/// task is open.
#[derive(Debug, Default)]
pub struct PendingTasks {
    next_id: u64,
    open: BTreeMap<u64, &'static str>,
}

#[must_use = "a registered task must be completed"]
#[derive(Debug)]
pub struct TaskToken {
    id: u64,
}

impl PendingTasks {
    pub fn register(&mut self, label: &'static str) -> TaskToken {
        self.next_id += 1;
        self.open.insert(self.next_id, label);
        TaskToken { id: self.next_id }
    }

    pub fn complete(&mut self, token: TaskToken) {
        self.open.remove(&token.id);
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.open.values().copied().collect()
    }
}

pub struct ServiceWorker<H> {
    host: H,
    origin: String,
    state: WorkerState,
    pending: PendingTasks,
}

impl<H: NotificationHost> ServiceWorker<H> {
    pub fn new(host: H, origin: &str) -> Self {
        Self {
            host,
            origin: origin.trim_end_matches('/').to_string(),
            state: WorkerState::Uninstalled,
            pending: PendingTasks::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn pending_tasks(&self) -> &PendingTasks {
        &self.pending
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Installs and, unless skipping the wait fails, activates right away so
    /// new handlers apply without closing existing tabs.
    pub async fn install(&mut self) -> EventOutcome {
        if self.state != WorkerState::Uninstalled {
            tracing::warn!(state = ?self.state, "install ignored");
            return EventOutcome::Ignored;
        }
        tracing::info!("service worker installing");
        self.state = WorkerState::Installing;
        let token = self.pending.register("install");
        let skipped = self.host.skip_waiting().await;
        self.pending.complete(token);
        self.state = WorkerState::Installed;

        match skipped {
            Ok(()) => self.activate().await,
            Err(err) => {
                tracing::warn!(error = %err, "skip waiting failed; worker stays waiting");
                EventOutcome::Ignored
            }
        }
    }

    pub async fn activate(&mut self) -> EventOutcome {
        if self.state != WorkerState::Installed {
            tracing::warn!(state = ?self.state, "activate ignored");
            return EventOutcome::Ignored;
        }
        tracing::info!("service worker activating");
        self.state = WorkerState::Activating;
        let token = self.pending.register("activate");
        if let Err(err) = self.host.claim_clients().await {
            tracing::warn!(error = %err, "failed to claim clients");
        }
        self.pending.complete(token);
        self.state = WorkerState::Activated;
        EventOutcome::Activated
    }

    /// A newer worker took over.
    pub fn retire(&mut self) {
        self.state = WorkerState::Redundant;
    }

    pub async fn handle_push(&mut self, data: Option<&[u8]>) -> EventOutcome {
        if self.state != WorkerState::Activated {
            tracing::warn!(state = ?self.state, "push event before activation dropped");
            return EventOutcome::Dropped;
        }
        let Some(data) = data else {
            tracing::debug!("push event without payload");
            return EventOutcome::Ignored;
        };
        let payload = match decode_push(data) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to parse push payload");
                return EventOutcome::Dropped;
            }
        };

        let mut payload = normalize(payload);
        let title = payload
            .title
            .take()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let options = DisplayOptions::from_payload(payload);
        self.show(&title, &options, "push").await
    }

    pub async fn handle_notification_click(&mut self, click: NotificationClick) -> EventOutcome {
        if self.state != WorkerState::Activated {
            tracing::warn!(state = ?self.state, "notification click before activation dropped");
            return EventOutcome::Dropped;
        }
        self.host.close_notification(click.tag.as_deref());
        if DISMISS_ACTIONS.contains(&click.action.as_str()) {
            return EventOutcome::Closed;
        }
        let Some(url) = click.data.get("url").and_then(Value::as_str) else {
            return EventOutcome::Closed;
        };
        let target = self.resolve_url(url);

        let token = self.pending.register("notificationclick");
        let outcome = self.focus_or_open(target).await;
        self.pending.complete(token);
        outcome
    }

    pub async fn handle_message(&mut self, message: &Value) -> EventOutcome {
        let message = match WorkerMessage::deserialize(message) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "unrecognized message ignored");
                return EventOutcome::Ignored;
            }
        };

        match message {
            WorkerMessage::ShowNotification { title, options } => {
                if self.state != WorkerState::Activated {
                    tracing::warn!(state = ?self.state, "show notification before activation dropped");
                    return EventOutcome::Dropped;
                }
                self.show(&title, &options, "message").await
            }
            WorkerMessage::SkipWaiting => {
                if self.state != WorkerState::Installed {
                    return EventOutcome::Ignored;
                }
                let token = self.pending.register("skip-waiting");
                let skipped = self.host.skip_waiting().await;
                self.pending.complete(token);
                match skipped {
                    Ok(()) => self.activate().await,
                    Err(err) => {
                        tracing::warn!(error = %err, "skip waiting failed");
                        EventOutcome::Dropped
                    }
                }
            }
        }
    }

    async fn show(
        &mut self,
        title: &str,
        options: &DisplayOptions,
        source: &'static str,
    ) -> EventOutcome {
        let token = self.pending.register(source);
        let shown = self.host.show_notification(title, options).await;
        self.pending.complete(token);
        match shown {
            Ok(()) => EventOutcome::Displayed,
            Err(err) => {
                tracing::error!(error = %err, source, "failed to show notification");
                EventOutcome::Dropped
            }
        }
    }

    async fn focus_or_open(&self, target: String) -> EventOutcome {
        let clients = self.host.match_clients().await;
        if let Some(client) = clients.iter().find(|client| client.url == target) {
            return match self.host.focus_client(&client.id).await {
                Ok(()) => EventOutcome::Focused(target),
                Err(err) => {
                    tracing::error!(error = %err, "failed to focus client");
                    EventOutcome::Dropped
                }
            };
        }
        match self.host.open_window(&target).await {
            Ok(()) => EventOutcome::OpenedWindow(target),
            Err(err) => {
                tracing::error!(error = %err, url = %target, "failed to open window");
                EventOutcome::Dropped
            }
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("https://") || url.starts_with("http://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.origin)
        } else {
            format!("{}/{url}", self.origin)
        }
    }
}

fn decode_push(data: &[u8]) -> Result<NotificationPayload, serde_json::Error> {
    let value: Value = serde_json::from_slice(data)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("push payload is not a JSON object"));
    }
    NotificationPayload::deserialize(value)
}
