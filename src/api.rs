//! HTTP surface: router, handlers and their request/response shapes.
//!
//! Every sync endpoint authenticates the raw Telegram `initData` string
//! carried in the request itself (query parameter or JSON body); there
//! is no session or cookie concept. Authentication and configuration
//! problems are terminal for a request, while storage problems degrade
//! to empty results to keep sync best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::auth::{verify_init_data, UserIdentity};
use crate::models::{Subscription, Transaction, Wish};
use crate::reminder::ReminderScan;
use crate::storage::{DocumentUpdate, RemoteKvStore, UserRepository};
use crate::telegram::{welcome_text, MessageGateway};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repo: UserRepository,
    /// Present only when `TELEGRAM_BOT_TOKEN` is configured.
    pub bot_token: Option<String>,
    /// Outbound messaging; present iff the bot token is.
    pub gateway: Option<Arc<dyn MessageGateway>>,
    /// Remote store handle, kept for the diagnostics ping.
    pub remote_store: Option<RemoteKvStore>,
    /// Bearer secret for the reminder trigger.
    pub cron_secret: Option<String>,
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(get_data).post(post_data))
        .route("/api/sync", post(sync))
        .route("/api/cron/remind", get(remind).post(remind))
        .route("/api/status", get(status))
        .route("/api/webhook", post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Shared auth ladder: configuration, presence, then verification.
fn authenticate(state: &AppState, init_data: Option<&str>) -> Result<UserIdentity, Response> {
    let bot_token = state.bot_token.as_deref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "TELEGRAM_BOT_TOKEN not configured",
        )
    })?;
    let init_data = match init_data {
        Some(data) if !data.is_empty() => data,
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "initData required",
            ))
        }
    };
    verify_init_data(init_data, bot_token, Utc::now().timestamp()).map_err(|e| {
        tracing::debug!("initData rejected: {e}");
        error_response(StatusCode::UNAUTHORIZED, "Invalid or expired initData")
    })
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Read user data
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse {
    transactions: Vec<Transaction>,
    subscriptions: Vec<Subscription>,
    wishes: Vec<Wish>,
    updated_at: Option<DateTime<Utc>>,
    language: Option<String>,
    base_currency: Option<String>,
}

#[derive(Deserialize)]
struct InitDataBody {
    #[serde(rename = "initData")]
    init_data: Option<String>,
}

async fn get_data(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    data_response(&state, params.get("initData").map(String::as_str)).await
}

async fn post_data(State(state): State<AppState>, Json(body): Json<InitDataBody>) -> Response {
    data_response(&state, body.init_data.as_deref()).await
}

/// Returns the caller's document, or an all-empty default when the user
/// has never synced (including when the store is unreachable).
async fn data_response(state: &AppState, init_data: Option<&str>) -> Response {
    let user = match authenticate(state, init_data) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let response = match state.repo.read(user.id).await {
        Some(doc) => DataResponse {
            transactions: doc.transactions,
            subscriptions: doc.subscriptions,
            wishes: doc.wishes,
            updated_at: Some(doc.updated_at),
            language: doc.language,
            base_currency: doc.base_currency,
        },
        None => DataResponse {
            transactions: Vec::new(),
            subscriptions: Vec::new(),
            wishes: Vec::new(),
            updated_at: None,
            language: None,
            base_currency: None,
        },
    };
    Json(response).into_response()
}

// ============================================================================
// Write / sync user data
// ============================================================================

/// Sync payload. List fields that are present but not arrays, and
/// preference fields that are not strings, are treated as absent rather
/// than rejected, so older clients never fail a sync on shape drift.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    init_data: Option<String>,
    #[serde(default, deserialize_with = "supplied_entries")]
    transactions: Option<Vec<Transaction>>,
    #[serde(default, deserialize_with = "supplied_entries")]
    subscriptions: Option<Vec<Subscription>>,
    #[serde(default, deserialize_with = "supplied_entries")]
    wishes: Option<Vec<Wish>>,
    #[serde(default, deserialize_with = "supplied_string")]
    language: Option<String>,
    #[serde(default, deserialize_with = "supplied_string")]
    base_currency: Option<String>,
}

/// `None` when the field is not an array; entries that don't match the
/// schema are dropped.
fn supplied_entries<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(entries) => Ok(Some(
            entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// `None` when the field is not a string.
fn supplied_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

#[derive(Serialize)]
struct SyncResponse {
    ok: bool,
}

async fn sync(State(state): State<AppState>, Json(body): Json<SyncRequest>) -> Response {
    let user = match authenticate(&state, body.init_data.as_deref()) {
        Ok(user) => user,
        Err(response) => return response,
    };

    state
        .repo
        .write(
            user.id,
            DocumentUpdate {
                transactions: body.transactions,
                subscriptions: body.subscriptions,
                wishes: body.wishes,
                language: body.language,
                base_currency: body.base_currency,
                updated_at: None,
            },
        )
        .await;

    Json(SyncResponse { ok: true }).into_response()
}

// ============================================================================
// Reminder trigger
// ============================================================================

#[derive(Serialize)]
struct RemindResponse {
    ok: bool,
    sent: usize,
    failed: usize,
}

/// Runs the reminder scan. Protected by `CRON_SECRET` when configured;
/// requires the messaging gateway.
async fn remind(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.cron_secret {
        let expected = format!("Bearer {secret}");
        let supplied = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if supplied != Some(expected.as_str()) {
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    let gateway = match &state.gateway {
        Some(gateway) => gateway.clone(),
        None => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "TELEGRAM_BOT_TOKEN not configured",
            )
        }
    };

    let report = ReminderScan::new(state.repo.clone(), gateway).run_now().await;
    Json(RemindResponse {
        ok: true,
        sent: report.notified,
        failed: report.failures.len(),
    })
    .into_response()
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    telegram_bot: &'static str,
    store: &'static str,
    hint_sync: &'static str,
}

/// Reports what is configured and reachable, never the credentials
/// themselves.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let telegram_bot = if state.bot_token.is_some() {
        "configured"
    } else {
        "missing"
    };

    let store = match &state.remote_store {
        Some(remote) => match remote.ping().await {
            Ok(()) => "remote",
            Err(e) => {
                tracing::warn!("remote store ping failed: {e}");
                "remote_unreachable"
            }
        },
        None => "memory",
    };

    let hint_sync = match store {
        "remote" => "Sync is persistent",
        "remote_unreachable" => "KV env set but the store is unreachable — check URL and token",
        _ => "No remote store configured — data is kept in memory and lost on restart",
    };

    Json(StatusResponse {
        telegram_bot,
        store,
        hint_sync,
    })
}

// ============================================================================
// Telegram webhook
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TelegramUpdate {
    message: Option<TelegramMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramMessage {
    chat: Option<TelegramChat>,
    text: Option<String>,
    from: Option<TelegramSender>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TelegramSender {
    language_code: Option<String>,
}

/// Bot webhook. Replies to `/start` with a localized welcome; every
/// well-formed delivery is acknowledged with 200 so Telegram does not
/// retry.
async fn webhook(State(state): State<AppState>, body: String) -> Response {
    let gateway = match &state.gateway {
        Some(gateway) => gateway.clone(),
        None => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "TELEGRAM_BOT_TOKEN not configured",
            )
        }
    };

    let update: TelegramUpdate = serde_json::from_str(&body).unwrap_or_default();
    let message = update.message.unwrap_or_default();
    let chat_id = match message.chat.and_then(|chat| chat.id) {
        Some(id) => id,
        None => return "ok".into_response(),
    };
    let text = message.text.as_deref().unwrap_or("").trim().to_string();

    if text == "/start" || text.starts_with("/start ") {
        let lang = message
            .from
            .and_then(|sender| sender.language_code);
        let welcome = welcome_text(lang.as_deref());
        if let Err(e) = gateway.send_message(chat_id, welcome).await {
            tracing::warn!("welcome message failed for chat {chat_id}: {e}");
        }
    }

    "ok".into_response()
}
