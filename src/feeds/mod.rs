//! RSS/Atom feed fetching and normalization.
//!
//! Raw feed bytes become normalized [`FeedItem`] records via feed-rs.
//! Fetches honor a minimum one-second interval per domain.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app::{EstuaryError, Result};

const USER_AGENT: &str = "Estuary/0.1 (+https://github.com/estuary-reader)";
const MIN_DOMAIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub items: Vec<FeedItem>,
}

pub struct FeedParser {
    client: Client,
    domain_last_fetch: Mutex<HashMap<String, Instant>>,
}

impl FeedParser {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EstuaryError::FeedParse(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            domain_last_fetch: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(30)
    }

    /// Fetch and parse a feed URL, rate-limited per domain.
    pub async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        let domain = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default();
        self.rate_limit(&domain).await;

        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let body = response.bytes().await?;

        self.parse(url, &body)
    }

    /// Parse raw feed bytes into normalized items.
    pub fn parse(&self, url: &str, body: &[u8]) -> Result<ParsedFeed> {
        let feed =
            parser::parse(body).map_err(|e| EstuaryError::FeedParse(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let item_url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default();

                // Prefer full content over the summary.
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .map(|c| decode_html_entities(&c).to_string())
                    .unwrap_or_default();

                FeedItem {
                    url: item_url,
                    title: entry
                        .title
                        .map(|t| decode_html_entities(&t.content).to_string())
                        .unwrap_or_else(|| "Untitled".into()),
                    author: entry.authors.first().map(|a| a.name.clone()),
                    published: entry
                        .published
                        .or(entry.updated)
                        .map(|dt| dt.with_timezone(&Utc)),
                    content,
                }
            })
            .collect();

        Ok(ParsedFeed {
            url: url.to_string(),
            title: feed
                .title
                .map(|t| decode_html_entities(&t.content).to_string())
                .unwrap_or_else(|| "Unknown Feed".into()),
            description: feed
                .description
                .map(|d| decode_html_entities(&d.content).to_string()),
            items,
        })
    }

    /// Enforce a minimum interval between requests to the same domain.
    async fn rate_limit(&self, domain: &str) {
        let wait = {
            let mut last = self.domain_last_fetch.lock().await;
            let now = Instant::now();
            let wait = last.get(domain).and_then(|prev| {
                let elapsed = now.duration_since(*prev);
                (elapsed < MIN_DOMAIN_INTERVAL).then(|| MIN_DOMAIN_INTERVAL - elapsed)
            });
            last.insert(domain.to_string(), now + wait.unwrap_or_default());
            wait
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <description>A test feed</description>
    <item>
      <title>Test Item 1</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <description>This is item 1</description>
    </item>
    <item>
      <title>Test Item 2</title>
      <link>https://example.com/item2</link>
      <guid>item-2</guid>
      <description>This is item 2</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <subtitle>An Atom test feed</subtitle>
  <entry>
    <title>Atom Entry 1</title>
    <link href="https://example.com/atom1"/>
    <id>atom-entry-1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary>This is Atom entry 1</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let parser = FeedParser::with_defaults().unwrap();
        let feed = parser
            .parse("https://example.com/feed.xml", RSS_SAMPLE.as_bytes())
            .unwrap();

        assert_eq!(feed.title, "Test Feed");
        assert_eq!(feed.description.as_deref(), Some("A test feed"));
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].title, "Test Item 1");
        assert_eq!(feed.items[0].url, "https://example.com/item1");
        assert!(feed.items[0].published.is_some());
        assert_eq!(feed.items[0].content, "This is item 1");
    }

    #[test]
    fn test_parse_atom() {
        let parser = FeedParser::with_defaults().unwrap();
        let feed = parser
            .parse("https://example.com/feed.atom", ATOM_SAMPLE.as_bytes())
            .unwrap();

        assert_eq!(feed.title, "Atom Test Feed");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].url, "https://example.com/atom1");
        assert_eq!(feed.items[0].content, "This is Atom entry 1");
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        let parser = FeedParser::with_defaults().unwrap();
        assert!(parser
            .parse("https://example.com/feed.xml", b"<html>not a feed</html>")
            .is_err());
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_same_domain_requests() {
        let parser = FeedParser::with_defaults().unwrap();
        let start = Instant::now();
        parser.rate_limit("example.com").await;
        parser.rate_limit("example.com").await;
        assert!(start.elapsed() >= MIN_DOMAIN_INTERVAL);
    }

    #[tokio::test]
    async fn test_rate_limit_distinct_domains_do_not_wait() {
        let parser = FeedParser::with_defaults().unwrap();
        let start = Instant::now();
        parser.rate_limit("a.example.com").await;
        parser.rate_limit("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
