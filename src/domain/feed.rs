use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// URL of the reserved feed holding library items.
pub const STANDALONE_FEED_URL: &str = "local://standalone";

/// URL-scheme prefix of synthetic newsletter feeds.
pub const NEWSLETTER_SCHEME: &str = "newsletter://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub category: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Computed by the store when listing; per-user when a user id is given.
    pub unread_count: i64,
}

impl Feed {
    pub fn new(url: String, name: String) -> Self {
        Self {
            id: 0,
            url,
            name,
            category: None,
            last_fetched: None,
            fetch_error: None,
            created_at: Utc::now(),
            unread_count: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }

    /// Holds library items rather than RSS entries.
    pub fn is_standalone(&self) -> bool {
        self.url == STANDALONE_FEED_URL
    }

    /// Populated by the Gmail poller rather than RSS refresh.
    pub fn is_newsletter(&self) -> bool {
        self.url.starts_with(NEWSLETTER_SCHEME)
    }
}

/// Partial feed update applied by the store.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub clear_category: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_kind_predicates() {
        let rss = Feed::new("https://example.com/feed.xml".into(), "Example".into());
        assert!(!rss.is_standalone());
        assert!(!rss.is_newsletter());

        let library = Feed::new(STANDALONE_FEED_URL.into(), "Library".into());
        assert!(library.is_standalone());

        let newsletter = Feed::new("newsletter://news@example.com".into(), "News".into());
        assert!(newsletter.is_newsletter());
    }

    #[test]
    fn test_display_name_falls_back_to_url() {
        let feed = Feed::new("https://example.com/feed.xml".into(), String::new());
        assert_eq!(feed.display_name(), "https://example.com/feed.xml");
    }
}
