//! Payment-reminder batch scan.
//!
//! Walks every stored user document, finds active subscriptions with
//! reminders enabled that are due within the next few days, and sends
//! each user one aggregated message through the [`MessageGateway`].
//!
//! The scan is stateless between runs: triggering it twice inside the
//! due window resends the same reminders. Per-user dispatch failures
//! are recorded and never abort the rest of the fan-out.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use futures::{stream, StreamExt};

use crate::billing::{days_in_month, days_until_billing};
use crate::models::{Subscription, UserDocument};
use crate::storage::UserRepository;
use crate::telegram::{GatewayError, MessageGateway};

/// Subscriptions due within this many days (inclusive) trigger a reminder.
const DUE_WINDOW_DAYS: u32 = 3;
/// How many users are processed concurrently.
const FAN_OUT_LIMIT: usize = 8;

/// Outcome of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Users that received a reminder.
    pub notified: usize,
    /// Users whose dispatch failed, with the failure.
    pub failures: Vec<(i64, GatewayError)>,
}

/// The reminder batch job.
#[derive(Clone)]
pub struct ReminderScan {
    repo: UserRepository,
    gateway: Arc<dyn MessageGateway>,
}

impl ReminderScan {
    pub fn new(repo: UserRepository, gateway: Arc<dyn MessageGateway>) -> Self {
        Self { repo, gateway }
    }

    /// Runs the scan against the current calendar date.
    pub async fn run_now(&self) -> ScanReport {
        let now = Utc::now();
        self.run(now.day(), days_in_month(now.year(), now.month()))
            .await
    }

    /// Runs the scan for an explicit "today". `days_in_month` must
    /// describe the month containing it.
    pub async fn run(&self, today: u32, days_in_month: u32) -> ScanReport {
        let user_ids = self.repo.list_user_ids().await;
        tracing::info!("reminder scan over {} user(s)", user_ids.len());

        let outcomes: Vec<(i64, Result<bool, GatewayError>)> = stream::iter(user_ids)
            .map(|user_id| async move {
                (user_id, self.notify_user(user_id, today, days_in_month).await)
            })
            .buffer_unordered(FAN_OUT_LIMIT)
            .collect()
            .await;

        let mut report = ScanReport::default();
        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(true) => report.notified += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("reminder dispatch failed for user {user_id}: {e}");
                    report.failures.push((user_id, e));
                }
            }
        }
        tracing::info!(
            "reminder scan done: {} notified, {} failed",
            report.notified,
            report.failures.len()
        );
        report
    }

    /// Sends one user their reminder if anything is due.
    ///
    /// Returns `Ok(false)` when the user has nothing due (or no
    /// document at all) and no message was sent.
    async fn notify_user(
        &self,
        user_id: i64,
        today: u32,
        days_in_month: u32,
    ) -> Result<bool, GatewayError> {
        let doc = match self.repo.read(user_id).await {
            Some(doc) if !doc.subscriptions.is_empty() => doc,
            _ => return Ok(false),
        };

        let due: Vec<(&Subscription, u32)> = doc
            .subscriptions
            .iter()
            .filter(|sub| sub.is_active && sub.notify)
            .filter_map(|sub| {
                let days = days_until_billing(sub.billing_date, today, days_in_month);
                (days <= DUE_WINDOW_DAYS).then_some((sub, days))
            })
            .collect();
        if due.is_empty() {
            return Ok(false);
        }

        let text = compose_message(&doc, &due);
        self.gateway.send_message(user_id, &text).await?;
        Ok(true)
    }
}

/// Builds the aggregated reminder text, localized by the user's stored
/// language preference (en fallback).
fn compose_message(doc: &UserDocument, due: &[(&Subscription, u32)]) -> String {
    let lang = doc.language.as_deref().unwrap_or("en");
    let currency = doc.base_currency.as_deref();

    let lines: Vec<String> = due
        .iter()
        .map(|(sub, days)| {
            let price = match currency {
                Some(code) => format!("{} {code}", sub.price),
                None => sub.price.to_string(),
            };
            format!("• {} — {price} ({})", sub.name, due_label(lang, *days))
        })
        .collect();

    format!("{}\n\n{}", header(lang), lines.join("\n"))
}

fn header(lang: &str) -> &'static str {
    match lang {
        "ru" => "🔔 FinTrack: скоро списание подписок",
        "pl" => "🔔 FinTrack: nadchodzące płatności subskrypcji",
        _ => "🔔 FinTrack: upcoming subscription payments",
    }
}

fn due_label(lang: &str, days: u32) -> String {
    match (lang, days) {
        ("ru", 0) => "Сегодня".to_string(),
        ("ru", 1) => "Завтра".to_string(),
        ("ru", n) => format!("Через {n} дн."),
        ("pl", 0) => "dzisiaj".to_string(),
        ("pl", 1) => "jutro".to_string(),
        ("pl", n) => format!("za {n} dni"),
        (_, 0) => "today".to_string(),
        (_, 1) => "tomorrow".to_string(),
        (_, n) => format!("in {n} days"),
    }
}
