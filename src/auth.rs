//! Telegram Mini App initData verification.
//!
//! Every request from the mini app carries the raw `initData` query
//! string issued by the Telegram client. Its `hash` field is an
//! HMAC-SHA256 signature over the remaining fields, keyed by a value
//! derived from the bot token (see
//! <https://core.telegram.org/bots/webapps#validating-data-received-via-the-mini-app>).
//!
//! Verification is a pure function of the payload, the bot token and
//! the current Unix time, so handlers pass `Utc::now().timestamp()` and
//! tests pass fixed instants.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of `auth_date`, in seconds (24 hours).
const MAX_AUTH_AGE_SECS: i64 = 86_400;

/// The verified identity embedded in a valid initData payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    /// Telegram user id, also the chat id for bot messages.
    pub id: i64,
}

/// Reasons an initData payload is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("initData is empty")]
    EmptyInitData,
    #[error("bot token is empty")]
    EmptyBotToken,
    #[error("initData has no hash field")]
    MissingHash,
    #[error("hash field is not valid hex")]
    MalformedHash,
    #[error("signature does not match")]
    SignatureMismatch,
    #[error("auth_date is not a valid timestamp")]
    InvalidAuthDate,
    #[error("auth_date is expired or in the future")]
    StaleAuthDate,
    #[error("initData has no user field")]
    MissingUser,
    #[error("user field is not a JSON object with a numeric id")]
    InvalidUser,
}

/// Verifies an initData payload and returns the embedded user identity.
///
/// `now_unix` is the verification instant in Unix seconds. The
/// freshness check is skipped entirely when `auth_date` is absent,
/// matching the Telegram client's historical behavior for payloads
/// without a timestamp.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    now_unix: i64,
) -> Result<UserIdentity, AuthError> {
    if init_data.is_empty() {
        return Err(AuthError::EmptyInitData);
    }
    if bot_token.is_empty() {
        return Err(AuthError::EmptyBotToken);
    }

    let pairs = parse_query_pairs(init_data);
    let hash = pairs
        .iter()
        .find(|(k, _)| k == "hash")
        .map(|(_, v)| v.clone())
        .ok_or(AuthError::MissingHash)?;

    verify_signature(&pairs, &hash, bot_token)?;
    check_freshness(&pairs, now_unix)?;

    let user_json = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .ok_or(AuthError::MissingUser)?;
    let user: serde_json::Value =
        serde_json::from_str(user_json).map_err(|_| AuthError::InvalidUser)?;
    let id = user
        .get("id")
        .and_then(|id| id.as_i64())
        .ok_or(AuthError::InvalidUser)?;

    Ok(UserIdentity { id })
}

/// Checks the signature over the canonical data-check string.
///
/// The signing key is HMAC-SHA256 of the bot token keyed by the literal
/// string `"WebAppData"`. The hex-encoded hash is decoded and compared
/// in constant time via `Mac::verify_slice`.
fn verify_signature(
    pairs: &[(String, String)],
    hash: &str,
    bot_token: &str,
) -> Result<(), AuthError> {
    let expected = hex::decode(hash).map_err(|_| AuthError::MalformedHash)?;

    let mut sorted: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| k != "hash").collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check_string = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut key_mac = HmacSha256::new_from_slice(b"WebAppData")
        .expect("HMAC accepts any key length");
    key_mac.update(bot_token.as_bytes());
    let secret_key = key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).expect("HMAC accepts any key length");
    mac.update(data_check_string.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::SignatureMismatch)
}

/// Rejects payloads whose `auth_date` is unparseable, in the future, or
/// older than 24 hours. Absent `auth_date` skips the check.
fn check_freshness(pairs: &[(String, String)], now_unix: i64) -> Result<(), AuthError> {
    let auth_date = match pairs.iter().find(|(k, _)| k == "auth_date") {
        Some((_, v)) if !v.is_empty() => v,
        _ => return Ok(()),
    };
    let issued: i64 = auth_date
        .parse()
        .map_err(|_| AuthError::InvalidAuthDate)?;
    let age = now_unix - issued;
    if !(0..=MAX_AUTH_AGE_SECS).contains(&age) {
        return Err(AuthError::StaleAuthDate);
    }
    Ok(())
}

/// Splits a `application/x-www-form-urlencoded` query string into
/// decoded key/value pairs. Pairs that fail to percent-decode keep
/// their raw text.
fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|cow| cow.into_owned())
        .unwrap_or(plus_decoded)
}

/// Signs arbitrary (already decoded) pairs the way the Telegram client
/// does and returns the encoded initData string. Test helper shared
/// with the router tests.
#[cfg(test)]
pub(crate) fn sign_init_data(pairs: &[(&str, &str)], bot_token: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let data_check_string = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut key_mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
    key_mac.update(bot_token.as_bytes());
    let secret_key = key_mac.finalize().into_bytes();
    let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
    mac.update(data_check_string.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    encoded.push(format!("hash={hash}"));
    encoded.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "test-bot-token-123";
    const NOW: i64 = 1_700_000_000;

    fn sign_pairs(pairs: &[(&str, &str)], bot_token: &str) -> String {
        sign_init_data(pairs, bot_token)
    }

    fn valid_init_data(user_id: i64, auth_date: i64) -> String {
        let user = format!(r#"{{"id":{user_id}}}"#);
        let auth_date = auth_date.to_string();
        sign_pairs(&[("auth_date", &auth_date), ("user", &user)], BOT_TOKEN)
    }

    #[test]
    fn test_valid_init_data_returns_user_id() {
        let init_data = valid_init_data(12345, NOW - 60);
        let identity = verify_init_data(&init_data, BOT_TOKEN, NOW).unwrap();
        assert_eq!(identity, UserIdentity { id: 12345 });
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert_eq!(
            verify_init_data("", BOT_TOKEN, NOW),
            Err(AuthError::EmptyInitData)
        );
        let init_data = valid_init_data(1, NOW);
        assert_eq!(
            verify_init_data(&init_data, "", NOW),
            Err(AuthError::EmptyBotToken)
        );
    }

    #[test]
    fn test_missing_hash_rejected() {
        let init_data = "user=%7B%22id%22%3A123%7D&auth_date=123";
        assert_eq!(
            verify_init_data(init_data, BOT_TOKEN, NOW),
            Err(AuthError::MissingHash)
        );
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let init_data = valid_init_data(123, NOW - 60);
        // Flip one hex digit of the hash.
        let tampered = if init_data.ends_with('0') {
            format!("{}1", &init_data[..init_data.len() - 1])
        } else {
            format!("{}0", &init_data[..init_data.len() - 1])
        };
        assert_eq!(
            verify_init_data(&tampered, BOT_TOKEN, NOW),
            Err(AuthError::SignatureMismatch)
        );
    }

    #[test]
    fn test_non_hex_hash_rejected() {
        let init_data = "user=%7B%22id%22%3A123%7D&hash=not-hex";
        assert_eq!(
            verify_init_data(init_data, BOT_TOKEN, NOW),
            Err(AuthError::MalformedHash)
        );
    }

    #[test]
    fn test_wrong_bot_token_rejected() {
        let init_data = valid_init_data(111, NOW - 60);
        assert_eq!(
            verify_init_data(&init_data, "other-bot-token", NOW),
            Err(AuthError::SignatureMismatch)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let init_data = valid_init_data(111, NOW - 60);
        let tampered = init_data.replace("%3A111", "%3A222");
        assert_eq!(
            verify_init_data(&tampered, BOT_TOKEN, NOW),
            Err(AuthError::SignatureMismatch)
        );
    }

    #[test]
    fn test_auth_date_exactly_24h_accepted() {
        let init_data = valid_init_data(7, NOW - MAX_AUTH_AGE_SECS);
        assert!(verify_init_data(&init_data, BOT_TOKEN, NOW).is_ok());
    }

    #[test]
    fn test_auth_date_over_24h_rejected() {
        let init_data = valid_init_data(7, NOW - MAX_AUTH_AGE_SECS - 1);
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::StaleAuthDate)
        );
    }

    #[test]
    fn test_auth_date_in_future_rejected() {
        let init_data = valid_init_data(7, NOW + 10);
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::StaleAuthDate)
        );
    }

    #[test]
    fn test_unparseable_auth_date_rejected() {
        let init_data = sign_pairs(
            &[("auth_date", "not-a-number"), ("user", r#"{"id":789}"#)],
            BOT_TOKEN,
        );
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::InvalidAuthDate)
        );
    }

    #[test]
    fn test_absent_auth_date_skips_freshness_check() {
        let init_data = sign_pairs(&[("user", r#"{"id":42}"#)], BOT_TOKEN);
        let identity = verify_init_data(&init_data, BOT_TOKEN, NOW).unwrap();
        assert_eq!(identity.id, 42);
    }

    #[test]
    fn test_missing_user_rejected() {
        let auth_date = NOW.to_string();
        let init_data = sign_pairs(&[("auth_date", &auth_date)], BOT_TOKEN);
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::MissingUser)
        );
    }

    #[test]
    fn test_non_json_user_rejected() {
        let init_data = sign_pairs(&[("user", "not json")], BOT_TOKEN);
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::InvalidUser)
        );
    }

    #[test]
    fn test_non_numeric_user_id_rejected() {
        let init_data = sign_pairs(&[("user", r#"{"id":"123"}"#)], BOT_TOKEN);
        assert_eq!(
            verify_init_data(&init_data, BOT_TOKEN, NOW),
            Err(AuthError::InvalidUser)
        );
    }

    #[test]
    fn test_extra_fields_participate_in_signature() {
        let user = r#"{"id":5}"#;
        let init_data = sign_pairs(
            &[("user", user), ("query_id", "AAF9x"), ("chat_type", "private")],
            BOT_TOKEN,
        );
        assert!(verify_init_data(&init_data, BOT_TOKEN, NOW).is_ok());

        let tampered = init_data.replace("chat_type=private", "chat_type=group");
        assert_eq!(
            verify_init_data(&tampered, BOT_TOKEN, NOW),
            Err(AuthError::SignatureMismatch)
        );
    }
}
