//! Gmail OAuth token handling for IMAP access.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::Value;

use crate::app::{EstuaryError, Result};
use crate::domain::GmailConfig;
use crate::store::SqliteStore;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access tokens are refreshed when they expire within this window.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Raw XOAUTH2 string. The IMAP layer base64-encodes it during AUTHENTICATE.
pub fn xoauth2_string(email: &str, access_token: &str) -> String {
    format!("user={}\x01auth=Bearer {}\x01\x01", email, access_token)
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn refresh_access_token(
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<RefreshedTokens> {
    let client = Client::new();
    let response = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = response.status();
    let payload: Value = response.json().await?;

    if !status.is_success() {
        let detail = payload
            .get("error_description")
            .or_else(|| payload.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(EstuaryError::Imap(format!("Token refresh failed: {}", detail)));
    }

    let access_token = payload
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| EstuaryError::Imap("Token response missing access_token".into()))?
        .to_string();
    let expires_in = payload
        .get("expires_in")
        .and_then(Value::as_i64)
        .unwrap_or(3600);

    Ok(RefreshedTokens {
        access_token,
        // Google may or may not rotate the refresh token.
        refresh_token: payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .unwrap_or(refresh_token)
            .to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

/// Return a valid access token, refreshing and persisting it when the stored
/// one expires within the buffer window.
pub async fn valid_access_token(
    store: &SqliteStore,
    config: &GmailConfig,
    client_id: &str,
    client_secret: &str,
) -> Result<String> {
    if !config.token_expiring_within(Duration::minutes(EXPIRY_BUFFER_MINUTES)) {
        return Ok(config.access_token.clone());
    }

    let refreshed =
        refresh_access_token(client_id, client_secret, &config.refresh_token).await?;
    store.update_gmail_tokens(
        &refreshed.access_token,
        &refreshed.refresh_token,
        refreshed.expires_at,
    )?;
    Ok(refreshed.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xoauth2_string_shape() {
        let s = xoauth2_string("me@gmail.com", "ya29.token");
        assert_eq!(s, "user=me@gmail.com\u{1}auth=Bearer ya29.token\u{1}\u{1}");
    }

    #[test]
    fn test_expiry_buffer() {
        let mut config = GmailConfig {
            email: "me@gmail.com".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            token_expires_at: Utc::now() + Duration::minutes(2),
            monitored_label: "Newsletters".into(),
            last_fetched_uid: 0,
            poll_interval_minutes: 30,
            is_enabled: true,
        };
        assert!(config.token_expiring_within(Duration::minutes(EXPIRY_BUFFER_MINUTES)));

        config.token_expires_at = Utc::now() + Duration::hours(1);
        assert!(!config.token_expiring_within(Duration::minutes(EXPIRY_BUFFER_MINUTES)));
    }
}
