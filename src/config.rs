//! Environment-variable configuration.
//!
//! Variables:
//! - `FINTRACK_PORT`: port to listen on (default: 8080)
//! - `TELEGRAM_BOT_TOKEN`: bot token; required for authentication,
//!   reminders and the webhook (endpoints answer 503 without it)
//! - `KV_REST_API_URL` / `KV_REST_API_TOKEN`: Upstash-style Redis REST
//!   store; when either is absent the server falls back to the bounded
//!   in-memory store
//! - `CRON_SECRET`: when set, `/api/cron/remind` requires it as a
//!   bearer token
//! - `FINTRACK_MEMORY_CAP`: entry cap for the in-memory fallback
//!   store (default: 5000)

/// Default cap for the in-memory fallback store.
const DEFAULT_MEMORY_CAP: usize = 5000;

/// Remote store credentials.
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub url: String,
    pub token: String,
}

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Telegram bot token; `None` means auth-dependent endpoints are
    /// unavailable.
    pub bot_token: Option<String>,
    /// Remote store credentials; `None` selects the memory fallback.
    pub remote_store: Option<RemoteStoreConfig>,
    /// Bearer secret protecting the reminder trigger.
    pub cron_secret: Option<String>,
    /// Entry cap for the memory fallback store.
    pub memory_cap: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let port = std::env::var("FINTRACK_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let bot_token = non_empty_var("TELEGRAM_BOT_TOKEN");

        let remote_store = match (
            non_empty_var("KV_REST_API_URL"),
            non_empty_var("KV_REST_API_TOKEN"),
        ) {
            (Some(url), Some(token)) => Some(RemoteStoreConfig { url, token }),
            _ => None,
        };

        let cron_secret = non_empty_var("CRON_SECRET");

        let memory_cap = std::env::var("FINTRACK_MEMORY_CAP")
            .ok()
            .and_then(|cap| cap.parse().ok())
            .unwrap_or(DEFAULT_MEMORY_CAP);

        Self {
            port,
            bot_token,
            remote_store,
            cron_secret,
            memory_cap,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_var_filters_blank() {
        std::env::set_var("FINTRACK_TEST_BLANK", "");
        assert!(non_empty_var("FINTRACK_TEST_BLANK").is_none());
        std::env::set_var("FINTRACK_TEST_BLANK", "value");
        assert_eq!(
            non_empty_var("FINTRACK_TEST_BLANK").as_deref(),
            Some("value")
        );
        std::env::remove_var("FINTRACK_TEST_BLANK");
    }
}
