pub mod adapters;
mod app;
mod assets;
pub mod auth;
pub mod config;
pub mod ports;
pub mod push;
pub mod realtime;
pub mod state;
pub mod storage;
pub mod types;
pub mod watcher;
pub mod worker;

pub use app::{StartupError, app};
pub use push::vapid::{DEFAULT_PUBLIC_KEY_PREFIX, VapidCredentials, generate_vapid_credentials};

use adapters::TokioTimeProvider;

pub async fn serve(config: config::AppConfig) -> Result<(), StartupError> {
    let addr = config.bind;
    let sender = push::sender_from_config(&config);
    let state = app::build_state(config, sender)?;
    let reaper = realtime::spawn_reaper(state.orders.clone(), TokioTimeProvider);
    let evictor = watcher::spawn_evictor(state.watchers.clone(), TokioTimeProvider);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!(%addr, "listening");

    let result = axum::serve(listener, app::router(state))
        .await
        .map_err(StartupError::Serve);
    reaper.abort();
    evictor.abort();
    result
}
