//! FinTrack sync server.
//!
//! Backend for the FinTrack Telegram mini app: cross-device sync of the
//! per-user finance document, initData authentication, and the
//! subscription payment-reminder scan.
//!
//! # Endpoints
//!
//! - `GET /health`: health check (no auth)
//! - `GET|POST /api/data`: read the caller's document (initData auth)
//! - `POST /api/sync`: merge-write the caller's document (initData auth)
//! - `GET|POST /api/cron/remind`: run the reminder scan (bearer secret
//!   when `CRON_SECRET` is set)
//! - `GET /api/status`: configuration diagnostics, no secrets exposed
//! - `POST /api/webhook`: Telegram bot webhook (`/start` welcome)
//!
//! Configuration is environment-only; see [`config::Config`].

mod api;
mod auth;
mod billing;
mod config;
mod models;
mod reminder;
mod storage;
mod telegram;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::Config;
use storage::{KeyValueStore, MemoryKvStore, RemoteKvStore, UserRepository};
use telegram::{MessageGateway, TelegramClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fintrack_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let remote_store = config
        .remote_store
        .as_ref()
        .map(|remote| RemoteKvStore::new(remote.url.clone(), remote.token.clone()));

    let store: Arc<dyn KeyValueStore> = match &remote_store {
        Some(remote) => {
            tracing::info!("using remote key-value store");
            Arc::new(remote.clone())
        }
        None => {
            tracing::warn!(
                "no remote store configured; falling back to in-memory store \
                 (cap {} entries, data lost on restart)",
                config.memory_cap
            );
            Arc::new(MemoryKvStore::new(config.memory_cap))
        }
    };

    let gateway: Option<Arc<dyn MessageGateway>> = match &config.bot_token {
        Some(token) => Some(Arc::new(TelegramClient::new(token.clone()))),
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set; auth and reminders are disabled");
            None
        }
    };

    let state = AppState {
        repo: UserRepository::new(store),
        bot_token: config.bot_token.clone(),
        gateway,
        remote_store,
        cron_secret: config.cron_secret.clone(),
    };

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app).await.expect("server error");
}
