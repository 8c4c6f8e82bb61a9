use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user read/bookmark state for a shared article.
///
/// Absence of a row is interpreted as unread and not bookmarked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserArticleState {
    pub user_id: i64,
    pub article_id: i64,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_bookmarked: bool,
    pub bookmarked_at: Option<DateTime<Utc>>,
}

/// Recognized settings keys.
pub mod settings {
    pub const REFRESH_INTERVAL_MINUTES: &str = "refresh_interval_minutes";
    pub const AUTO_SUMMARIZE: &str = "auto_summarize";
    pub const MARK_READ_ON_OPEN: &str = "mark_read_on_open";
    pub const DEFAULT_MODEL: &str = "default_model";
    pub const LLM_PROVIDER: &str = "llm_provider";
}

/// Read/bookmark counters for a user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserStats {
    pub read_count: i64,
    pub bookmarked_count: i64,
}
