use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }

    /// Sort key: high before normal before low.
    pub fn order(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// A rule must carry at least one filter (feed, keyword, or author).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: i64,
    pub name: String,
    pub feed_id: Option<i64>,
    pub keyword: Option<String>,
    pub author: Option<String>,
    pub priority: Priority,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationHistoryEntry {
    pub id: i64,
    pub article_id: i64,
    pub rule_id: Option<i64>,
    pub notified_at: DateTime<Utc>,
    pub dismissed: bool,
}

/// Result of matching a new article against the active rules.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMatch {
    pub article_id: i64,
    pub article_title: String,
    pub feed_id: i64,
    pub rule_id: i64,
    pub rule_name: String,
    pub priority: Priority,
    pub match_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High.order() < Priority::Normal.order());
        assert!(Priority::Normal.order() < Priority::Low.order());
    }

    #[test]
    fn test_priority_round_trip() {
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            assert_eq!(Priority::from_str(p.as_str()), p);
        }
        assert_eq!(Priority::from_str("bogus"), Priority::Normal);
    }
}
