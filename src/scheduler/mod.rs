//! Feed refresh scheduling and the per-item ingestion pipeline.
//!
//! `refresh_all` walks every RSS feed, parsing and ingesting sequentially to
//! honor per-domain rate limits; a single in-progress flag makes overlapping
//! refreshes a no-op rather than a queue. Notification matches collected
//! across a refresh land in a buffer the HTTP surface drains on poll.
//! Failures stay contained: a bad item does not stop its feed, and a failing
//! feed does not stop the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::app::Result;
use crate::domain::{state::settings, Article, NewArticle, NotificationMatch};
use crate::extract::html;
use crate::feeds::{FeedParser, ParsedFeed};
use crate::fetch::{EnhancedFetcher, FetchPolicy};
use crate::llm::ModelTier;
use crate::notify::NotificationEngine;
use crate::resolver::SourceResolver;
use crate::store::SqliteStore;
use crate::summarize::{Summarizer, Summary};

/// Feed items with less embedded content than this get a full fetch.
const MIN_ITEM_CONTENT: usize = 500;

const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 30;

pub struct Scheduler {
    store: Arc<SqliteStore>,
    feed_parser: Arc<FeedParser>,
    fetcher: Arc<EnhancedFetcher>,
    resolver: Arc<SourceResolver>,
    summarizer: Option<Arc<Summarizer>>,
    notifications: NotificationEngine,
    refresh_in_progress: AtomicBool,
    last_refresh_notifications: std::sync::Mutex<Vec<NotificationMatch>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<SqliteStore>,
        feed_parser: Arc<FeedParser>,
        fetcher: Arc<EnhancedFetcher>,
        resolver: Arc<SourceResolver>,
        summarizer: Option<Arc<Summarizer>>,
    ) -> Self {
        let notifications = NotificationEngine::new(store.clone());
        Self {
            store,
            feed_parser,
            fetcher,
            resolver,
            summarizer,
            notifications,
            refresh_in_progress: AtomicBool::new(false),
            last_refresh_notifications: std::sync::Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Drain the last-refresh notifications buffer atomically.
    pub fn take_notifications(&self) -> Vec<NotificationMatch> {
        match self.last_refresh_notifications.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    /// Periodic refresh loop; the interval setting is re-read every cycle.
    pub async fn run(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.refresh_all().await {
                error!("Feed refresh failed: {}", e);
            }

            let interval_minutes = self
                .store
                .get_setting(settings::REFRESH_INTERVAL_MINUTES)
                .ok()
                .flatten()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MINUTES);
            tokio::time::sleep(Duration::from_secs(interval_minutes.max(1) * 60)).await;
        }
    }

    /// Refresh every RSS feed. A refresh already in progress makes this an
    /// immediate no-op success; it is not queued.
    pub async fn refresh_all(&self) -> Result<()> {
        if self
            .refresh_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Refresh already in progress, skipping");
            return Ok(());
        }

        if let Ok(mut buffer) = self.last_refresh_notifications.lock() {
            buffer.clear();
        }

        let result = self.refresh_all_inner().await;
        self.refresh_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn refresh_all_inner(&self) -> Result<()> {
        let feeds = self.store.list_feeds(None)?;
        let mut total_matches = Vec::new();

        for feed in feeds {
            if feed.is_newsletter() || feed.is_standalone() {
                continue;
            }
            match self.refresh_feed_inner(feed.id, &feed.url).await {
                Ok(mut matches) => total_matches.append(&mut matches),
                Err(e) => {
                    warn!("Error refreshing feed {}: {}", feed.url, e);
                }
            }
        }

        if let Ok(mut buffer) = self.last_refresh_notifications.lock() {
            buffer.extend(total_matches);
        }
        Ok(())
    }

    /// Refresh one feed on demand.
    pub async fn refresh_feed(&self, feed_id: i64) -> Result<Vec<NotificationMatch>> {
        let feed = self
            .store
            .get_feed(feed_id, None)?
            .ok_or_else(|| crate::app::EstuaryError::NotFound(format!("Feed {}", feed_id)))?;
        if feed.is_newsletter() || feed.is_standalone() {
            return Ok(Vec::new());
        }
        self.refresh_feed_inner(feed_id, &feed.url).await
    }

    async fn refresh_feed_inner(
        &self,
        feed_id: i64,
        feed_url: &str,
    ) -> Result<Vec<NotificationMatch>> {
        match self.feed_parser.fetch(feed_url).await {
            Ok(parsed) => {
                let matches = self.ingest_feed_items(feed_id, &parsed).await?;
                self.store.update_feed_fetched(feed_id, None)?;
                Ok(matches)
            }
            Err(e) => {
                self.store.update_feed_fetched(feed_id, Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Ingest a parsed feed's items in feed order. Per-item failures are
    /// isolated; already-known URLs are skipped quietly.
    pub async fn ingest_feed_items(
        &self,
        feed_id: i64,
        parsed: &ParsedFeed,
    ) -> Result<Vec<NotificationMatch>> {
        let auto_summarize = self
            .store
            .get_setting(settings::AUTO_SUMMARIZE)?
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let mut matches = Vec::new();
        for item in &parsed.items {
            if item.url.is_empty() {
                continue;
            }
            if self.store.get_article_by_url(&item.url)?.is_some() {
                continue;
            }

            let mut article = NewArticle::new(feed_id, &item.url, &item.title);
            article.author = item.author.clone();
            article.published_at = item.published;

            // Thin feed content earns a full fetch; any failure falls back
            // to the feed-provided body.
            if item.content.len() < MIN_ITEM_CONTENT {
                match self.fetcher.fetch(&item.url, FetchPolicy::default()).await {
                    Ok(result) if !result.content.is_empty() => {
                        article = article.with_content(&result.content);
                        article.reading_time_minutes = result.reading_time_minutes;
                        article.word_count = result.word_count;
                        article.featured_image = result.featured_image.clone();
                        article.has_code_blocks = result.has_code_blocks;
                        article.code_languages = result.code_languages.clone();
                        article.site_name = result.site_name.clone();
                        article.categories = result.categories.clone();
                        article.is_paywalled = result.is_paywalled;
                        article.extractor_used = Some(result.extractor_used.clone());
                    }
                    Ok(_) => {
                        article = article.with_content(&item.content);
                    }
                    Err(e) => {
                        warn!("Fetch failed for {}, using feed content: {}", item.url, e);
                        article = article.with_content(&item.content);
                    }
                }
            } else {
                article = article.with_content(&item.content);
            }

            // Aggregator URLs resolve to their publisher before anything
            // downstream needs the source.
            if SourceResolver::is_aggregator(&item.url) {
                let outcome = self.resolver.resolve(&item.url, &item.content).await;
                article.source_url = outcome.source_url;
            }

            let Some(article_id) = self.store.add_article(&article)? else {
                continue;
            };

            if let Some(stored) = self.store.get_article(article_id)? {
                match self.notifications.evaluate_and_record(&stored) {
                    Ok(Some(m)) => {
                        info!(
                            "Notification match for article {}: {}",
                            article_id, m.match_reason
                        );
                        matches.push(m);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Notification evaluation failed: {}", e),
                }
            }

            if auto_summarize && self.summarizer.is_some() {
                if let Err(e) = self.summarize_article(article_id, None).await {
                    warn!("Error summarizing article {}: {}", item.url, e);
                }
            }
        }

        Ok(matches)
    }

    /// Summarize an article and persist the result. Content that turns out
    /// to be aggregator link soup is first replaced via source resolution or
    /// a refetch; if nothing usable can be found, no summary is written.
    pub async fn summarize_article(
        &self,
        article_id: i64,
        force_model: Option<ModelTier>,
    ) -> Result<Option<Summary>> {
        let Some(summarizer) = &self.summarizer else {
            return Ok(None);
        };
        let Some(article) = self.store.get_article(article_id)? else {
            return Ok(None);
        };

        let content = article.content.clone().unwrap_or_default();
        if content.trim().len() < 50 {
            info!("Article {} has insufficient content for summarization", article_id);
            return Ok(None);
        }

        let working_content = if is_usable_content(&content) {
            content
        } else {
            match self.salvage_content(&article).await? {
                Some(content) => content,
                None => {
                    info!(
                        "Article {} content is not suitable for summarization",
                        article_id
                    );
                    return Ok(None);
                }
            }
        };

        let summary = summarizer
            .summarize(&working_content, &article.url, &article.title, force_model)
            .await?;
        self.store.update_summary(
            article_id,
            &summary.one_liner,
            &summary.full_summary,
            &summary.key_points,
            summary.model_used.as_str(),
        )?;
        Ok(Some(summary))
    }

    /// Replace aggregator link soup with real article content, via the
    /// source URL when one can be resolved, else a refetch of the original.
    async fn salvage_content(&self, article: &Article) -> Result<Option<String>> {
        let content = article.content.as_deref().unwrap_or_default();

        if SourceResolver::is_aggregator(&article.url) {
            let outcome = self.resolver.resolve(&article.url, content).await;
            if let Some(source_url) = outcome.source_url {
                if let Ok(result) = self.fetcher.fetch(&source_url, FetchPolicy::default()).await
                {
                    if is_usable_content(&result.content) {
                        self.store.update_article_content(article.id, &result.content)?;
                        self.store.update_article_source_url(article.id, &source_url)?;
                        return Ok(Some(result.content));
                    }
                }
                return Ok(None);
            }
        }

        if let Ok(result) = self.fetcher.fetch(&article.url, FetchPolicy::default()).await {
            if is_usable_content(&result.content) {
                self.store.update_article_content(article.id, &result.content)?;
                return Ok(Some(result.content));
            }
        }
        Ok(None)
    }
}

/// Reject content that is aggregator link soup rather than an article:
/// mostly links, nearly no text, or a numbered headline list.
pub fn is_usable_content(content: &str) -> bool {
    if content.trim().len() < 50 {
        return false;
    }

    let doc = html::parse_fragment(content);
    let text = html::fragment_text(content);

    if let Some(sel) = html::selector("a") {
        let link_text: usize = doc
            .select(&sel)
            .map(|a| html::element_text(&a).len())
            .sum();
        if link_text > 0 && link_text as f64 > text.len() as f64 * 0.8 {
            return false;
        }
    }

    if text.len() < 100 {
        return false;
    }

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() > 3 {
        let short = lines.iter().filter(|l| l.len() < 100).count();
        if short as f64 > lines.len() as f64 * 0.8 {
            let numbered = lines.iter().filter(|l| is_numbered_headline(l)).count();
            if numbered as f64 > lines.len() as f64 * 0.5 {
                return false;
            }
        }
    }

    true
}

/// Lines like "1. Headline" or "2) Headline".
fn is_numbered_headline(line: &str) -> bool {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let rest = &line[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::feeds::FeedItem;
    use crate::fetch::Fetcher;
    use crate::llm::{Capabilities, CompletionRequest, LlmResponse, Provider};
    use async_trait::async_trait;

    struct StaticProvider {
        response: String,
    }

    #[async_trait]
    impl Provider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                supports_system_prompt: true,
                supports_prompt_caching: false,
                supports_json_mode: false,
                supports_streaming: false,
                max_context_tokens: 100_000,
            }
        }

        fn model_for_tier(&self, tier: ModelTier) -> String {
            format!("static-{}", tier.as_str())
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                text: self.response.clone(),
                model: "static".into(),
                ..Default::default()
            })
        }
    }

    fn scheduler_with_summarizer(response: Option<&str>) -> (Arc<SqliteStore>, Scheduler) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let summarizer = response.map(|r| {
            Arc::new(Summarizer::new(
                Arc::new(StaticProvider {
                    response: r.to_string(),
                }),
                None,
                true,
            ))
        });
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(FeedParser::with_defaults().unwrap()),
            Arc::new(EnhancedFetcher::new(
                Fetcher::with_defaults().unwrap(),
                None,
                None,
            )),
            Arc::new(SourceResolver::with_defaults().unwrap()),
            summarizer,
        );
        (store, scheduler)
    }

    fn parsed_feed(items: Vec<FeedItem>) -> ParsedFeed {
        ParsedFeed {
            url: "https://example.com/feed.xml".into(),
            title: "Example".into(),
            description: None,
            items,
        }
    }

    fn long_item(url: &str, title: &str) -> FeedItem {
        FeedItem {
            url: url.into(),
            title: title.into(),
            author: None,
            published: None,
            content: format!("<p>{}</p>", "article body text. ".repeat(60)),
        }
    }

    #[tokio::test]
    async fn test_ingest_skips_existing_and_empty_urls() {
        let (store, scheduler) = scheduler_with_summarizer(None);
        let feed_id = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();

        let feed = parsed_feed(vec![
            long_item("https://example.com/a", "A"),
            FeedItem {
                url: String::new(),
                title: "no url".into(),
                author: None,
                published: None,
                content: "x".into(),
            },
        ]);

        scheduler.ingest_feed_items(feed_id, &feed).await.unwrap();
        scheduler.ingest_feed_items(feed_id, &feed).await.unwrap();

        let articles = store
            .list_articles(&crate::domain::ArticleFilter {
                feed_id: Some(feed_id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_records_single_notification_for_best_rule() {
        let (store, scheduler) = scheduler_with_summarizer(None);
        let feed_id = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();
        let high_rule = store
            .add_rule("openai", None, Some("OpenAI"), None, Priority::High)
            .unwrap();
        store
            .add_rule("feedwide", Some(feed_id), None, None, Priority::Normal)
            .unwrap();

        let feed = parsed_feed(vec![long_item(
            "https://example.com/a",
            "OpenAI announces something",
        )]);
        let matches = scheduler.ingest_feed_items(feed_id, &feed).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule_id, high_rule);

        let history = store.list_notifications(10, true).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rule_id, Some(high_rule));
    }

    #[tokio::test]
    async fn test_auto_summarize_writes_summary_during_ingestion() {
        let step1 = r#"{"headline": "H1", "summary": "S1", "key_points": ["k1", "k2", "k3"], "content_type": "news"}"#;
        let (store, scheduler) = scheduler_with_summarizer(Some(step1));
        store.set_setting(settings::AUTO_SUMMARIZE, "true").unwrap();
        let feed_id = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();

        let feed = parsed_feed(vec![long_item("https://example.com/a", "Hello")]);
        scheduler.ingest_feed_items(feed_id, &feed).await.unwrap();

        let article = store
            .get_article_by_url("https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(article.summary_short.as_deref(), Some("H1"));
        assert_eq!(article.key_points.len(), 3);
        assert_eq!(article.model_used.as_deref(), Some("fast"));
        assert!(article.summarized_at.is_some());
    }

    #[tokio::test]
    async fn test_notifications_buffer_drains_atomically() {
        let (store, scheduler) = scheduler_with_summarizer(None);
        let feed_id = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();
        store
            .add_rule("feedwide", Some(feed_id), None, None, Priority::Normal)
            .unwrap();

        let feed = parsed_feed(vec![long_item("https://example.com/a", "A")]);
        let matches = scheduler.ingest_feed_items(feed_id, &feed).await.unwrap();
        scheduler
            .last_refresh_notifications
            .lock()
            .unwrap()
            .extend(matches);

        assert_eq!(scheduler.take_notifications().len(), 1);
        assert!(scheduler.take_notifications().is_empty());
    }

    #[test]
    fn test_usable_content_rejects_link_soup() {
        let soup = r#"<div>
            <a href="https://x.com/1">First headline about something</a>
            <a href="https://x.com/2">Second headline about something else</a>
            <a href="https://x.com/3">Third headline continuing the list</a>
        </div>"#;
        assert!(!is_usable_content(soup));

        let article = format!("<p>{}</p>", "Real article prose. ".repeat(30));
        assert!(is_usable_content(&article));
    }

    #[test]
    fn test_usable_content_rejects_numbered_headlines() {
        let listing = (1..=8)
            .map(|i| format!("{}. Headline number {}", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(!is_usable_content(&listing));
    }

    #[test]
    fn test_numbered_headline_detection() {
        assert!(is_numbered_headline("1. Something happened"));
        assert!(is_numbered_headline("12) Another thing"));
        assert!(!is_numbered_headline("No numbering here"));
        assert!(!is_numbered_headline("2024 was a big year"));
    }
}
