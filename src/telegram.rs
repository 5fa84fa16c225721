//! Outbound messaging through the Telegram Bot API.
//!
//! The rest of the crate talks to a [`MessageGateway`] trait so the
//! reminder scan and webhook handler can be tested with an in-memory
//! gateway; [`TelegramClient`] is the real implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";
/// Per-request timeout for Bot API calls.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors when dispatching a message.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("send failed: {0}")]
    Transport(String),
    #[error("Telegram returned status {0}")]
    BadStatus(u16),
}

/// Outbound message dispatch, keyed by the user's Telegram id.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), GatewayError>;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Bot API client for `sendMessage`.
#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { token, client }
    }
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the bot token.
        f.debug_struct("TelegramClient").finish()
    }
}

#[async_trait]
impl MessageGateway for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), GatewayError> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessageBody { chat_id, text })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::BadStatus(status.as_u16()));
        }
        Ok(())
    }
}

const WELCOME_RU: &str = "Привет! 👋\n\nЯ бот FinTrack — умный учёт финансов и подписок.\n\nОткрой приложение по кнопке меню ниже, чтобы вести расходы, следить за подписками и получать напоминания об оплате.";
const WELCOME_EN: &str = "Hi! 👋\n\nI'm FinTrack bot — smart finance and subscription tracker.\n\nOpen the app from the menu button below to track expenses, manage subscriptions and get payment reminders.";
const WELCOME_PL: &str = "Cześć! 👋\n\nJestem botem FinTrack — inteligentny tracker finansów i subskrypcji.\n\nOtwórz aplikację przyciskiem menu poniżej, aby śledzić wydatki i subskrypcje oraz otrzymywać przypomnienia o płatnościach.";

/// Picks the `/start` welcome text for a Telegram `language_code`.
/// Only the primary subtag matters; unknown languages fall back to
/// English.
pub fn welcome_text(language_code: Option<&str>) -> &'static str {
    let code = match language_code.and_then(|code| code.get(..2)) {
        Some(code) => code,
        None => return WELCOME_EN,
    };
    match code.to_ascii_lowercase().as_str() {
        "ru" => WELCOME_RU,
        "pl" => WELCOME_PL,
        _ => WELCOME_EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_text_by_language() {
        assert_eq!(welcome_text(Some("ru")), WELCOME_RU);
        assert_eq!(welcome_text(Some("ru-RU")), WELCOME_RU);
        assert_eq!(welcome_text(Some("pl")), WELCOME_PL);
        assert_eq!(welcome_text(Some("en")), WELCOME_EN);
        assert_eq!(welcome_text(Some("de")), WELCOME_EN);
        assert_eq!(welcome_text(Some("x")), WELCOME_EN);
        assert_eq!(welcome_text(None), WELCOME_EN);
    }

    #[test]
    fn test_debug_hides_token() {
        let client = TelegramClient::new("123:super-secret".to_string());
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"));
    }
}
