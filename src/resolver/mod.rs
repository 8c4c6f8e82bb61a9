//! Source-URL resolution for news aggregators.
//!
//! Given a Techmeme, Google News, Reddit, or Hacker News URL, find the
//! underlying publisher URL that should actually be fetched and summarized.
//! Resolution never fails hard: any network or parse problem yields an
//! outcome with no source URL and a diagnostic string, and the caller falls
//! back to the original URL.

mod google_news;
mod reddit;
mod techmeme;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::app::{EstuaryError, Result};
use crate::fetch::DESKTOP_USER_AGENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    Techmeme,
    GoogleNews,
    Reddit,
    HackerNews,
}

/// Host-substring patterns identifying each aggregator.
const AGGREGATOR_PATTERNS: &[(Aggregator, &[&str])] = &[
    (Aggregator::Techmeme, &["techmeme.com"]),
    (Aggregator::GoogleNews, &["news.google.com"]),
    (Aggregator::Reddit, &["reddit.com", "redd.it"]),
    (Aggregator::HackerNews, &["news.ycombinator.com"]),
];

/// Pause between sequential Google News decodes to stay under rate limits.
const GOOGLE_NEWS_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub source_url: Option<String>,
    pub aggregator: Option<Aggregator>,
    pub confidence: f64,
    pub error: Option<String>,
}

impl ResolveOutcome {
    fn found(aggregator: Aggregator, source_url: String, confidence: f64) -> Self {
        Self {
            source_url: Some(source_url),
            aggregator: Some(aggregator),
            confidence,
            error: None,
        }
    }

    fn missing(aggregator: Option<Aggregator>, error: impl Into<String>) -> Self {
        Self {
            source_url: None,
            aggregator,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }
}

pub struct SourceResolver {
    client: Client,
}

impl SourceResolver {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DESKTOP_USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| EstuaryError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(15)
    }

    pub fn identify(url: &str) -> Option<Aggregator> {
        let url_lower = url.to_lowercase();
        AGGREGATOR_PATTERNS
            .iter()
            .find(|(_, domains)| domains.iter().any(|d| url_lower.contains(d)))
            .map(|(aggregator, _)| *aggregator)
    }

    pub fn is_aggregator(url: &str) -> bool {
        Self::identify(url).is_some()
    }

    /// Resolve one aggregator URL. `content` is the RSS item description,
    /// used by the Techmeme decoder before falling back to a page fetch.
    pub async fn resolve(&self, url: &str, content: &str) -> ResolveOutcome {
        let Some(aggregator) = Self::identify(url) else {
            return ResolveOutcome::missing(None, "Not a known aggregator");
        };

        match aggregator {
            Aggregator::Techmeme => techmeme::resolve(&self.client, url, content).await,
            Aggregator::GoogleNews => google_news::resolve(&self.client, url).await,
            Aggregator::Reddit => reddit::resolve(&self.client, url).await,
            Aggregator::HackerNews => resolve_hackernews(url),
        }
    }

    /// Resolve many URLs. Google News items go through sequentially with a
    /// small pause between decodes; everything else resolves concurrently.
    pub async fn resolve_batch(&self, items: &[(String, String)]) -> Vec<ResolveOutcome> {
        let mut outcomes: Vec<Option<ResolveOutcome>> = vec![None; items.len()];

        let mut google_news = Vec::new();
        let mut concurrent = Vec::new();
        for (i, (url, content)) in items.iter().enumerate() {
            if Self::identify(url) == Some(Aggregator::GoogleNews) {
                google_news.push(i);
            } else {
                concurrent.push((i, self.resolve(url, content)));
            }
        }

        let (indices, futures): (Vec<_>, Vec<_>) = concurrent.into_iter().unzip();
        for (i, outcome) in indices
            .into_iter()
            .zip(futures::future::join_all(futures).await)
        {
            outcomes[i] = Some(outcome);
        }

        for (n, i) in google_news.iter().copied().enumerate() {
            if n > 0 {
                tokio::time::sleep(GOOGLE_NEWS_PAUSE).await;
            }
            outcomes[i] = Some(self.resolve(&items[i].0, &items[i].1).await);
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| ResolveOutcome::missing(None, "unresolved")))
            .collect()
    }
}

/// Hacker News RSS already points `link` at the source. A URL still on HN is
/// a self-post with no external source.
fn resolve_hackernews(url: &str) -> ResolveOutcome {
    if url.contains("news.ycombinator.com") {
        return ResolveOutcome {
            source_url: None,
            aggregator: Some(Aggregator::HackerNews),
            confidence: 1.0,
            error: Some("HN self-post (no external source)".into()),
        };
    }
    ResolveOutcome::found(Aggregator::HackerNews, url.to_string(), 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregator_identification() {
        assert_eq!(
            SourceResolver::identify("https://www.techmeme.com/250101/p1"),
            Some(Aggregator::Techmeme)
        );
        assert_eq!(
            SourceResolver::identify("https://news.google.com/articles/abc"),
            Some(Aggregator::GoogleNews)
        );
        assert_eq!(
            SourceResolver::identify("https://www.reddit.com/r/rust/comments/x/y"),
            Some(Aggregator::Reddit)
        );
        assert_eq!(
            SourceResolver::identify("https://news.ycombinator.com/item?id=1"),
            Some(Aggregator::HackerNews)
        );
        assert_eq!(SourceResolver::identify("https://example.com/a"), None);
    }

    #[test]
    fn test_hackernews_passthrough_and_self_post() {
        let outcome = resolve_hackernews("https://example.com/story");
        assert_eq!(outcome.source_url.as_deref(), Some("https://example.com/story"));
        assert_eq!(outcome.confidence, 1.0);

        let self_post = resolve_hackernews("https://news.ycombinator.com/item?id=42");
        assert!(self_post.source_url.is_none());
        assert!(self_post.error.is_some());
    }
}
