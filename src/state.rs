use crate::adapters::TokioTimeProvider;
use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::realtime::OrderFeed;
use crate::storage::SubscriptionStore;
use crate::watcher::{OrderWatcher, WatcherRegistry};

#[derive(Clone)]
pub struct AppState<S> {
    pub config: AppConfig,
    pub auth: Option<AuthState>,
    pub subscriptions: SubscriptionStore,
    /// `None` when VAPID keys are missing or incomplete.
    pub sender: Option<S>,
    pub orders: OrderFeed,
    pub watcher: OrderWatcher<S, TokioTimeProvider>,
    pub watchers: WatcherRegistry,
}
