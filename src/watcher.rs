//! Vendor-side reaction to new orders.
//!
//! A watcher owns the vendor's realtime channel, a keep-alive loop for that
//! channel, and the unread/toast state shown on the vendor dashboard. The
//! returned [`WatcherHandle`] releases all of it when dropped.

use crate::ports;
use crate::push;
use crate::realtime::{ChannelId, ChannelSubscription, HEARTBEAT_INTERVAL, OrderFeed};
use crate::storage::SubscriptionStore;
use crate::types::orders::{ChangeKind, Order};
use crate::types::push::{NotificationAction, NotificationPayload};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;

pub const ORDERS_VIEW_PATH: &str = "/vendor/orders";
pub const NEW_ORDER_TITLE: &str = "Pesanan Baru!";
/// Watchers nobody polled for this long are stopped.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(300);
pub const MAX_PENDING_TOASTS: usize = 50;
const MAX_TRACKED_ORDERS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub order_id: String,
    pub message: String,
    pub link: String,
}

/// Dashboard notification state for one signed-in vendor.
#[derive(Debug)]
pub struct VendorNotifications {
    vendor_id: String,
    unread: u32,
    seen_orders: HashSet<String>,
    seen_order_queue: VecDeque<String>,
    toasts: VecDeque<Toast>,
}

impl VendorNotifications {
    pub fn new(vendor_id: &str) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            unread: 0,
            seen_orders: HashSet::new(),
            seen_order_queue: VecDeque::new(),
            toasts: VecDeque::new(),
        }
    }

    /// Counts a newly created order. Returns the toast to show, or `None`
    /// for the vendor's own POS entries, other vendors' rows, and redelivered
    /// events.
    pub fn record_new_order(&mut self, order: &Order) -> Option<Toast> {
        if order.vendor_id != self.vendor_id || order.is_self_service() {
            return None;
        }
        if !self.seen_orders.insert(order.id.clone()) {
            tracing::debug!(order_id = %order.id, "duplicate order event ignored");
            return None;
        }
        self.seen_order_queue.push_back(order.id.clone());
        if self.seen_order_queue.len() > MAX_TRACKED_ORDERS
            && let Some(oldest) = self.seen_order_queue.pop_front()
        {
            self.seen_orders.remove(&oldest);
        }

        self.unread = self.unread.saturating_add(1);
        let toast = Toast {
            order_id: order.id.clone(),
            message: format!("Pesanan baru #{} masuk", short_id(&order.id)),
            link: ORDERS_VIEW_PATH.to_string(),
        };
        if self.toasts.len() == MAX_PENDING_TOASTS {
            self.toasts.pop_front();
        }
        self.toasts.push_back(toast.clone());
        Some(toast)
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// The vendor opened the orders view.
    pub fn mark_orders_viewed(&mut self) {
        self.unread = 0;
    }

    pub fn drain_toasts(&mut self) -> Vec<Toast> {
        self.toasts.drain(..).collect()
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn new_order_notification(order: &Order, origin: &str) -> NotificationPayload {
    let mut data = Map::new();
    data.insert(
        "url".to_string(),
        Value::String(format!("{}{}", origin.trim_end_matches('/'), ORDERS_VIEW_PATH)),
    );
    data.insert("orderId".to_string(), Value::String(order.id.clone()));
    NotificationPayload {
        title: Some(NEW_ORDER_TITLE.to_string()),
        body: Some(format!(
            "Ada pesanan baru #{} yang menunggu diproses.",
            short_id(&order.id)
        )),
        data,
        actions: vec![NotificationAction {
            action: "view".to_string(),
            title: "Lihat Pesanan".to_string(),
            icon: None,
        }],
        tag: Some(format!("order-{}", order.id)),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct OrderWatcher<S, T> {
    feed: OrderFeed,
    store: SubscriptionStore,
    sender: Option<S>,
    time: T,
    origin: String,
}

impl<S, T> OrderWatcher<S, T>
where
    S: ports::PushSender,
    T: ports::TimeProvider,
{
    pub fn new(
        feed: OrderFeed,
        store: SubscriptionStore,
        sender: Option<S>,
        time: T,
        origin: String,
    ) -> Self {
        Self {
            feed,
            store,
            sender,
            time,
            origin,
        }
    }

    /// Subscribes to the vendor's channel and starts the listener and
    /// keep-alive tasks.
    pub fn start(&self, vendor_id: &str) -> WatcherHandle {
        let channel = self.feed.subscribe_vendor(vendor_id, self.time.now());
        let channel_id = channel.id();
        let state = Arc::new(Mutex::new(VendorNotifications::new(vendor_id)));
        tracing::info!(vendor_id, topic = channel.topic(), "order watcher started");

        let listener = tokio::spawn(listen(
            channel,
            Arc::clone(&state),
            Delivery {
                vendor_id: vendor_id.to_string(),
                store: self.store.clone(),
                sender: self.sender.clone(),
                origin: self.origin.clone(),
            },
        ));
        let keepalive = tokio::spawn(keep_alive(
            self.feed.clone(),
            channel_id,
            self.time.clone(),
        ));

        WatcherHandle {
            vendor_id: vendor_id.to_string(),
            channel: channel_id,
            feed: self.feed.clone(),
            state,
            listener,
            keepalive,
        }
    }
}

pub struct WatcherHandle {
    vendor_id: String,
    channel: ChannelId,
    feed: OrderFeed,
    state: Arc<Mutex<VendorNotifications>>,
    listener: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn unread(&self) -> u32 {
        self.state().unread()
    }

    pub fn mark_orders_viewed(&self) {
        self.state().mark_orders_viewed();
    }

    pub fn drain_toasts(&self) -> Vec<Toast> {
        self.state().drain_toasts()
    }

    /// `false` once the channel was closed underneath the watcher.
    pub fn is_active(&self) -> bool {
        !self.listener.is_finished()
    }

    fn state(&self) -> MutexGuard<'_, VendorNotifications> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.listener.abort();
        self.keepalive.abort();
        self.feed.unsubscribe(self.channel);
        tracing::info!(vendor_id = %self.vendor_id, "order watcher stopped");
    }
}

/// Snapshot returned to a polling dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatcherStatus {
    pub unread: u32,
    pub toasts: Vec<Toast>,
    pub active: bool,
}

struct WatcherEntry {
    handle: WatcherHandle,
    last_poll: OffsetDateTime,
}

/// Running watchers keyed by vendor id. A watcher lives while its vendor
/// keeps polling; [`WatcherRegistry::evict_stale`] stops the rest.
#[derive(Clone, Default)]
pub struct WatcherRegistry {
    entries: Arc<Mutex<HashMap<String, WatcherEntry>>>,
}

impl WatcherRegistry {
    /// Returns the vendor's state, starting a watcher when none is running
    /// or the previous one lost its channel.
    pub fn poll(
        &self,
        vendor_id: &str,
        now: OffsetDateTime,
        start: impl FnOnce() -> WatcherHandle,
    ) -> WatcherStatus {
        let mut entries = self.lock();
        if entries
            .get(vendor_id)
            .is_some_and(|entry| !entry.handle.is_active())
        {
            entries.remove(vendor_id);
        }
        let entry = entries
            .entry(vendor_id.to_string())
            .or_insert_with(|| WatcherEntry {
                handle: start(),
                last_poll: now,
            });
        entry.last_poll = now;
        WatcherStatus {
            unread: entry.handle.unread(),
            toasts: entry.handle.drain_toasts(),
            active: entry.handle.is_active(),
        }
    }

    /// Resets the unread count. Returns `false` when no watcher is running.
    pub fn mark_orders_viewed(&self, vendor_id: &str, now: OffsetDateTime) -> bool {
        match self.lock().get_mut(vendor_id) {
            Some(entry) => {
                entry.handle.mark_orders_viewed();
                entry.last_poll = now;
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, vendor_id: &str) -> bool {
        let removed = self.lock().remove(vendor_id);
        removed.is_some()
    }

    /// Stops watchers that were not polled within `timeout` or whose
    /// channel is already closed.
    pub fn evict_stale(&self, now: OffsetDateTime, timeout: Duration) -> Vec<String> {
        let limit = timeout.as_millis() as i128;
        let mut entries = self.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| {
                !entry.handle.is_active()
                    || (now - entry.last_poll).whole_milliseconds() > limit
            })
            .map(|(vendor_id, _)| vendor_id.clone())
            .collect();
        for vendor_id in &stale {
            entries.remove(vendor_id);
            tracing::info!(vendor_id = %vendor_id, "idle order watcher evicted");
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WatcherEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn spawn_evictor<T: ports::TimeProvider>(
    watchers: WatcherRegistry,
    time: T,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            time.sleep(HEARTBEAT_INTERVAL).await;
            watchers.evict_stale(time.now(), POLL_TIMEOUT);
        }
    })
}

struct Delivery<S> {
    vendor_id: String,
    store: SubscriptionStore,
    sender: Option<S>,
    origin: String,
}

async fn listen<S: ports::PushSender>(
    mut channel: ChannelSubscription,
    state: Arc<Mutex<VendorNotifications>>,
    delivery: Delivery<S>,
) {
    while let Some(change) = channel.recv().await {
        if change.kind != ChangeKind::Insert {
            continue;
        }
        let Some(order) = change.record else {
            continue;
        };
        let (toast, unread) = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let toast = state.record_new_order(&order);
            (toast, state.unread())
        };
        let Some(toast) = toast else {
            continue;
        };
        tracing::info!(
            vendor_id = %delivery.vendor_id,
            order_id = %toast.order_id,
            unread,
            "new customer order"
        );

        // Detached so tearing the watcher down never cancels a send in flight.
        tokio::spawn(notify_vendor(
            delivery.store.clone(),
            delivery.sender.clone(),
            delivery.vendor_id.clone(),
            new_order_notification(&order, &delivery.origin),
        ));
    }
    tracing::info!(topic = channel.topic(), "realtime channel closed");
}

async fn notify_vendor<S: ports::PushSender>(
    store: SubscriptionStore,
    sender: Option<S>,
    vendor_id: String,
    notification: NotificationPayload,
) {
    let Some(sender) = sender else {
        tracing::warn!(vendor_id = %vendor_id, "push skipped: VAPID keys not configured");
        return;
    };
    let stored = match store.get(&vendor_id) {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            tracing::warn!(vendor_id = %vendor_id, "push skipped: vendor has no subscription");
            return;
        }
        Err(err) => {
            tracing::error!(vendor_id = %vendor_id, error = %err, "failed to load subscription");
            return;
        }
    };
    let subscription = match stored.descriptor() {
        Ok(subscription) => subscription,
        Err(err) => {
            tracing::error!(vendor_id = %vendor_id, error = %err, "stored subscription is malformed");
            return;
        }
    };
    if let Err(err) = push::deliver(&sender, &subscription, notification).await {
        tracing::error!(vendor_id = %vendor_id, error = %err, "new order push failed");
    }
}

async fn keep_alive<T: ports::TimeProvider>(feed: OrderFeed, channel: ChannelId, time: T) {
    loop {
        time.sleep(HEARTBEAT_INTERVAL).await;
        if !feed.heartbeat(channel, time.now()) {
            tracing::warn!("keep-alive stopped: realtime channel is gone");
            break;
        }
    }
}
