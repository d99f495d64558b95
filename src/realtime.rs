//! In-process realtime feed for order changes.
//!
//! Each vendor listens on its own channel (`orders-<vendor_id>`) that only
//! receives changes for that vendor's rows. Channels must ping the feed
//! periodically; channels that stay silent past the idle timeout are closed,
//! which ends their subscription stream.

use crate::ports;
use crate::types::orders::OrderChange;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

#[derive(Debug, Clone, Default)]
pub struct OrderFeed {
    inner: Arc<Mutex<FeedState>>,
}

#[derive(Debug, Default)]
struct FeedState {
    next_id: u64,
    channels: HashMap<ChannelId, ChannelEntry>,
}

#[derive(Debug)]
struct ChannelEntry {
    topic: String,
    vendor_id: String,
    last_heartbeat: OffsetDateTime,
    sender: mpsc::UnboundedSender<OrderChange>,
}

pub struct ChannelSubscription {
    id: ChannelId,
    topic: String,
    receiver: mpsc::UnboundedReceiver<OrderChange>,
}

impl ChannelSubscription {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next change for this channel; `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<OrderChange> {
        self.receiver.recv().await
    }
}

impl OrderFeed {
    pub fn subscribe_vendor(&self, vendor_id: &str, now: OffsetDateTime) -> ChannelSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let topic = format!("orders-{vendor_id}");
        let mut state = self.lock();
        state.next_id += 1;
        let id = ChannelId(state.next_id);
        state.channels.insert(
            id,
            ChannelEntry {
                topic: topic.clone(),
                vendor_id: vendor_id.to_string(),
                last_heartbeat: now,
                sender,
            },
        );
        tracing::debug!(topic = %topic, "realtime channel subscribed");
        ChannelSubscription {
            id,
            topic,
            receiver,
        }
    }

    /// Fans a change out to every channel of the row's vendor and returns
    /// how many channels received it.
    pub fn publish(&self, change: OrderChange) -> usize {
        let Some(vendor_id) = change.vendor_id() else {
            tracing::warn!(kind = ?change.kind, "order change without record dropped");
            return 0;
        };
        let mut state = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, entry) in state.channels.iter() {
            if entry.vendor_id != vendor_id {
                continue;
            }
            if entry.sender.send(change.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            state.channels.remove(&id);
        }
        delivered
    }

    /// Records a keep-alive ping. Returns `false` when the channel is gone.
    pub fn heartbeat(&self, id: ChannelId, now: OffsetDateTime) -> bool {
        match self.lock().channels.get_mut(&id) {
            Some(entry) => {
                entry.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, id: ChannelId) -> bool {
        let removed = self.lock().channels.remove(&id);
        if let Some(entry) = &removed {
            tracing::debug!(topic = %entry.topic, "realtime channel unsubscribed");
        }
        removed.is_some()
    }

    /// Closes channels whose last heartbeat is older than `idle_timeout`.
    pub fn reap_idle(&self, now: OffsetDateTime, idle_timeout: Duration) -> Vec<String> {
        let limit = idle_timeout.as_millis() as i128;
        let mut state = self.lock();
        let idle: Vec<ChannelId> = state
            .channels
            .iter()
            .filter(|(_, entry)| (now - entry.last_heartbeat).whole_milliseconds() > limit)
            .map(|(id, _)| *id)
            .collect();
        idle.into_iter()
            .filter_map(|id| state.channels.remove(&id))
            .map(|entry| {
                tracing::info!(topic = %entry.topic, "realtime channel closed after idle timeout");
                entry.topic
            })
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn spawn_reaper<T: ports::TimeProvider>(feed: OrderFeed, time: T) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            time.sleep(HEARTBEAT_INTERVAL).await;
            feed.reap_idle(time.now(), IDLE_TIMEOUT);
        }
    })
}
