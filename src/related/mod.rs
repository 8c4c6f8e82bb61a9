//! Related-links enrichment backed by the Exa neural-search API.
//!
//! Query construction prefers the article's existing key points, then
//! LLM-extracted concept keywords (cached on the article), then the bare
//! title. Results are deduplicated by URL, domain, and title, capped at two
//! per domain, and cached for a day under a normalized query key.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::app::{EstuaryError, Result};
use crate::cache::TieredCache;
use crate::domain::Article;
use crate::extract::html;
use crate::llm::{CompletionRequest, ModelTier, Provider};

const EXA_SEARCH_URL: &str = "https://api.exa.ai/search";
const CACHE_TTL_SECS: i64 = 86_400;
const MAX_RETRIES: usize = 3;
const MAX_PER_DOMAIN: usize = 2;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedLink {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub domain: String,
    pub published_date: Option<String>,
    pub score: Option<f64>,
}

pub struct RelatedLinksService {
    client: Client,
    api_key: String,
    cache: Arc<TieredCache>,
    provider: Arc<dyn Provider>,
}

impl RelatedLinksService {
    pub fn new(
        api_key: &str,
        cache: Arc<TieredCache>,
        provider: Arc<dyn Provider>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EstuaryError::Fetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            cache,
            provider,
        })
    }

    pub async fn fetch_related_links(
        &self,
        article: &Article,
        num_results: usize,
    ) -> Result<Vec<RelatedLink>> {
        let query = self.construct_search_query(article).await;
        info!("Searching for related links with query: {}", query);

        let cache_key = normalize_cache_key(&query);
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(links) = serde_json::from_value::<Vec<RelatedLink>>(cached) {
                debug!("Cache hit for related links query");
                return Ok(links);
            }
        }

        let raw_results = self.search_with_retry(&query, num_results + 10).await?;
        let links = dedupe_results(&raw_results, article, num_results);
        info!(
            "Found {} unique related links (from {} total)",
            links.len(),
            raw_results.len()
        );

        self.cache.set(
            &cache_key,
            serde_json::to_value(&links)?,
            Some(CACHE_TTL_SECS),
        );
        Ok(links)
    }

    /// Query preference: title + two key points, then title + extracted
    /// keywords, then the title alone.
    async fn construct_search_query(&self, article: &Article) -> String {
        match article.key_points.len() {
            n if n >= 2 => {
                return format!(
                    "{} {} {}",
                    article.title, article.key_points[0], article.key_points[1]
                );
            }
            1 => return format!("{} {}", article.title, article.key_points[0]),
            _ => {}
        }

        if article
            .content
            .as_deref()
            .is_some_and(|c| c.len() > 200)
        {
            let keywords = self.extract_keywords(article).await;
            if !keywords.is_empty() {
                let head: Vec<&str> = keywords.iter().take(3).map(String::as_str).collect();
                return format!("{} {}", article.title, head.join(" "));
            }
        }

        article.title.clone()
    }

    /// Fast-tier keyword extraction, reusing keywords already stored on the
    /// article.
    pub async fn extract_keywords(&self, article: &Article) -> Vec<String> {
        if !article.extracted_keywords.is_empty() {
            return article.extracted_keywords.clone();
        }

        let preview: String = html::fragment_text(article.content.as_deref().unwrap_or(""))
            .chars()
            .take(2000)
            .collect();
        let prompt = format!(
            "Extract 3-5 key concepts or topics from this article. Return ONLY the concepts, \
             one per line, no explanations.\n\nTitle: {}\n\nContent preview:\n{}\n\nKey concepts:",
            article.title, preview
        );

        let model = self.provider.model_for_tier(ModelTier::Fast);
        let response = match self
            .provider
            .complete(CompletionRequest::new(prompt).model(model).max_tokens(100))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Keyword extraction failed: {}", e);
                return Vec::new();
            }
        };

        response
            .text
            .lines()
            .map(str::trim)
            .filter(|line| line.len() > 2)
            .map(String::from)
            .take(5)
            .collect()
    }

    async fn search_with_retry(&self, query: &str, num_results: usize) -> Result<Vec<Value>> {
        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }
            match self.search(query, num_results).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    warn!("Exa API error (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EstuaryError::Fetch("Exa search failed".into())))
    }

    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(EXA_SEARCH_URL)
            .header("x-api-key", &self.api_key)
            .json(&json!({"query": query, "numResults": num_results}))
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(EstuaryError::Fetch(format!("Exa API status {}", status)));
        }

        Ok(payload
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// Lower-cased, whitespace-collapsed query hashed to a stable cache key.
pub fn normalize_cache_key(query: &str) -> String {
    let normalized = query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("related_links:{}", &hex::encode(hasher.finalize())[..16])
}

fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}

fn dedupe_results(results: &[Value], article: &Article, num_results: usize) -> Vec<RelatedLink> {
    let article_domain = extract_domain(&article.url);
    let article_title_lower = article.title.to_lowercase().trim().to_string();
    let mut seen_titles: Vec<String> = Vec::new();
    let mut links: Vec<RelatedLink> = Vec::new();

    for result in results {
        let Some(result_url) = result.get("url").and_then(Value::as_str) else {
            continue;
        };
        let title = result
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let title_lower = title.to_lowercase().trim().to_string();
        let domain = extract_domain(result_url);

        if result_url == article.url
            || domain == article_domain
            || title_lower == article_title_lower
            || seen_titles.contains(&title_lower)
        {
            continue;
        }
        if links.iter().filter(|l| l.domain == domain).count() >= MAX_PER_DOMAIN {
            continue;
        }

        let snippet: String = result
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .chars()
            .take(SNIPPET_CHARS)
            .collect();

        links.push(RelatedLink {
            url: result_url.to_string(),
            title: title.to_string(),
            snippet,
            domain,
            published_date: result
                .get("publishedDate")
                .and_then(Value::as_str)
                .map(String::from),
            score: result.get("score").and_then(Value::as_f64),
        });
        seen_titles.push(title_lower);

        if links.len() >= num_results {
            break;
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cache_key_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_cache_key("Rust   Async\nRuntimes"),
            normalize_cache_key("rust async runtimes")
        );
        assert_ne!(
            normalize_cache_key("rust async"),
            normalize_cache_key("rust sync")
        );
        assert!(normalize_cache_key("x").starts_with("related_links:"));
    }

    #[test]
    fn test_dedupe_rejects_own_article_and_caps_domains() {
        let article = article_with_title("Original story");
        let results = vec![
            json!({"url": "https://example.com/self", "title": "Original story", "text": ""}),
            json!({"url": "https://a.com/1", "title": "One", "text": "snippet"}),
            json!({"url": "https://a.com/2", "title": "Two", "text": ""}),
            json!({"url": "https://a.com/3", "title": "Three", "text": ""}),
            json!({"url": "https://b.com/1", "title": "One", "text": ""}),
            json!({"url": "https://c.com/1", "title": "Four", "text": ""}),
        ];

        let links = dedupe_results(&results, &article, 5);
        let domains: Vec<&str> = links.iter().map(|l| l.domain.as_str()).collect();

        // Own-domain and duplicate-title hits are gone; a.com capped at two.
        assert!(!domains.contains(&"example.com"));
        assert_eq!(domains.iter().filter(|d| **d == "a.com").count(), 2);
        assert_eq!(links.iter().filter(|l| l.title == "One").count(), 1);
        assert!(links.iter().any(|l| l.domain == "c.com"));
    }

    #[test]
    fn test_snippet_capped() {
        let article = article_with_title("T");
        let results = vec![json!({
            "url": "https://a.com/1",
            "title": "Long",
            "text": "x".repeat(500),
        })];
        let links = dedupe_results(&results, &article, 5);
        assert_eq!(links[0].snippet.len(), SNIPPET_CHARS);
    }

    fn article_with_title(title: &str) -> Article {
        use chrono::Utc;
        Article {
            id: 1,
            feed_id: 1,
            user_id: None,
            url: "https://example.com/self".into(),
            source_url: None,
            title: title.into(),
            author: None,
            content: None,
            content_hash: None,
            summary_short: None,
            summary_full: None,
            key_points: Vec::new(),
            model_used: None,
            summarized_at: None,
            is_read: false,
            read_at: None,
            is_bookmarked: false,
            bookmarked_at: None,
            content_type: None,
            file_name: None,
            file_path: None,
            reading_time_minutes: None,
            word_count: None,
            featured_image: None,
            has_code_blocks: false,
            code_languages: Vec::new(),
            site_name: None,
            categories: Vec::new(),
            is_paywalled: false,
            extractor_used: None,
            extracted_keywords: Vec::new(),
            related_links: None,
            published_at: None,
            created_at: Utc::now(),
        }
    }
}
