//! Per-user document repository on top of [`KeyValueStore`].
//!
//! Documents are stored as JSON under `"user:" + <telegram id>`. The
//! repository is safe to call from best-effort contexts (background
//! jobs, fire-and-forget sync): store failures and corrupt documents
//! degrade to "no data" and are logged, never raised.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::kv::KeyValueStore;
use crate::models::{Subscription, Transaction, UserDocument, Wish};

const KEY_PREFIX: &str = "user:";

/// A partial document write. Present fields replace the stored value
/// wholesale (lists are never merged element-wise); absent fields keep
/// whatever was stored before.
#[derive(Debug, Default, Clone)]
pub struct DocumentUpdate {
    pub transactions: Option<Vec<Transaction>>,
    pub subscriptions: Option<Vec<Subscription>>,
    pub wishes: Option<Vec<Wish>>,
    pub language: Option<String>,
    pub base_currency: Option<String>,
    /// Explicit timestamp; when absent the write is stamped with now.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository owning the per-user document schema.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn KeyValueStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(user_id: i64) -> String {
        format!("{KEY_PREFIX}{user_id}")
    }

    /// Reads and normalizes a user's document.
    ///
    /// Returns `None` when the key is absent, the store is unreachable,
    /// or the stored value is not valid JSON. A document that parses
    /// always has its list fields materialized (see [`UserDocument`]).
    pub async fn read(&self, user_id: i64) -> Option<UserDocument> {
        let key = Self::key(user_id);
        let raw = match self.store.get(&key).await {
            Ok(value) => value?,
            Err(e) => {
                tracing::warn!("store read failed for {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str::<UserDocument>(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("corrupt document for {key}, treating as missing: {e}");
                None
            }
        }
    }

    /// Merges `update` over the stored document and writes it back.
    ///
    /// Creates the document lazily on first write. A failed store write
    /// is logged and dropped; sync is a convenience copy, the client's
    /// local persistence remains the primary one.
    pub async fn write(&self, user_id: i64, update: DocumentUpdate) {
        let existing = self.read(user_id).await.unwrap_or_else(UserDocument::empty);

        let next = UserDocument {
            transactions: update.transactions.unwrap_or(existing.transactions),
            subscriptions: update.subscriptions.unwrap_or(existing.subscriptions),
            wishes: update.wishes.unwrap_or(existing.wishes),
            language: update.language.or(existing.language),
            base_currency: update.base_currency.or(existing.base_currency),
            updated_at: update.updated_at.unwrap_or_else(Utc::now),
        };

        let key = Self::key(user_id);
        let value = match serde_json::to_string(&next) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("failed to serialize document for {key}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&key, &value).await {
            tracing::warn!("store write dropped for {key}: {e}");
        }
    }

    /// All user ids currently present in the store. Keys with a
    /// malformed suffix are skipped; a store failure yields an empty
    /// list.
    pub async fn list_user_ids(&self) -> Vec<i64> {
        let keys = match self.store.list_keys(KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("store key listing failed: {e}");
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|key| parse_user_id_from_key(key))
            .collect()
    }
}

/// Extracts the user id from a store key.
///
/// The suffix is parsed as its longest leading digit run, so
/// `"user:12.3"` yields 12. This mirrors the historical JavaScript
/// `parseInt` behavior that existing stored keys were written under;
/// keep it permissive.
pub fn parse_user_id_from_key(key: &str) -> Option<i64> {
    let suffix = key.strip_prefix(KEY_PREFIX)?;
    let digits: String = suffix.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
