use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton Gmail polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub monitored_label: String,
    pub last_fetched_uid: u32,
    pub poll_interval_minutes: u64,
    pub is_enabled: bool,
}

impl GmailConfig {
    /// Token is expired or expires within the given buffer.
    pub fn token_expiring_within(&self, buffer: chrono::Duration) -> bool {
        self.token_expires_at <= Utc::now() + buffer
    }
}
