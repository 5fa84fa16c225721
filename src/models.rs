//! Wire and storage types for the per-user finance document.
//!
//! One JSON document is stored per Telegram user, shaped exactly like
//! the payload the mini app exchanges with the server:
//!
//! ```text
//! {
//!   "transactions": [...],
//!   "subscriptions": [...],
//!   "wishes": [...],
//!   "language": "en",
//!   "baseCurrency": "PLN",
//!   "updatedAt": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! Deserialization is deliberately lenient: stored documents come from
//! older client versions and must never fail to load because a field is
//! missing or has the wrong shape. Non-array list fields collapse to
//! empty lists, non-string preferences are dropped, and entries that no
//! longer match the schema are skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Direction of a money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Income,
    Expense,
}

/// A single income or expense entry.
///
/// `amount` is normalized to the user's reference currency by the
/// client; `original_amount`/`original_currency` keep the pre-conversion
/// input when the entry was made in another currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub title: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_currency: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    /// ISO timestamp string as supplied by the client.
    pub date: String,
}

/// A recurring monthly subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub price: f64,
    /// Day of month the payment is due (1-31).
    pub billing_date: u32,
    pub is_active: bool,
    /// Opt-in to payment reminders. Absent in documents written by old
    /// clients, which means opted out.
    #[serde(default)]
    pub notify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A wishlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wish {
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub is_completed: bool,
    pub created_at: String,
}

/// The full per-user document.
///
/// The list fields are always materialized on read, even when the
/// stored value was malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, deserialize_with = "lenient_entries")]
    pub transactions: Vec<Transaction>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub subscriptions: Vec<Subscription>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub wishes: Vec<Wish>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub base_currency: Option<String>,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl UserDocument {
    /// An all-empty document, used when a user has never synced.
    pub fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            subscriptions: Vec::new(),
            wishes: Vec::new(),
            language: None,
            base_currency: None,
            updated_at: Utc::now(),
        }
    }
}

/// Deserialize a list field, tolerating any shape.
///
/// Non-array values become an empty list; array entries that don't
/// match the expected schema are dropped rather than failing the whole
/// document.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(entries) => Ok(entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Deserialize an optional string preference, dropping non-string values.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Deserialize `updatedAt`, falling back to "now" when missing or invalid.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Ok(parsed.unwrap_or_else(Utc::now))
}
