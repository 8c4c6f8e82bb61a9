//! Content fetching: URL -> cleaned article content.
//!
//! The base [`Fetcher`] does an SSRF-validated HTTP GET and runs the
//! extractor dispatch (site-specific, then reader-mode, then heuristic
//! fallback). [`EnhancedFetcher`] layers JS-render and archive fallbacks on
//! top via an explicit state machine.

pub mod archive;
pub mod enhanced;
pub mod readability;
pub mod render;
pub mod ssrf;

pub use enhanced::{EnhancedFetcher, FetchPolicy};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::Client;

use crate::app::{EstuaryError, Result};
use crate::domain::Article;
use crate::extract::{self, html, ExtractedContent};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const MIN_CONTENT_LENGTH: usize = 500;

pub const PAYWALLED_DOMAINS: &[&str] = &[
    "wsj.com",
    "nytimes.com",
    "ft.com",
    "economist.com",
    "bloomberg.com",
    "washingtonpost.com",
    "theathletic.com",
    "businessinsider.com",
    "barrons.com",
    "telegraph.co.uk",
    "thetimes.co.uk",
];

const PAYWALL_PHRASES: &[&str] = &[
    "subscribe to continue",
    "subscription required",
    "sign in to read",
    "become a member",
    "subscribers only",
    "paywall",
    "this article is for subscribers",
    "to read the full article",
    "already a subscriber",
    "free articles remaining",
];

const BLOCK_PHRASES: &[&str] = &[
    "unusual activity",
    "detected unusual",
    "you're not a robot",
    "not a robot",
    "captcha",
    "verify you are human",
    "human verification",
    "security check",
    "please verify",
    "access denied",
    "cloudflare",
    "just a moment",
    "checking your browser",
    "enable javascript and cookies",
    "browser supports javascript",
    "ray id",
    "reference id",
    "why did this happen",
    "click the box below",
    "complete the security check",
    "pardon our interruption",
    "we need to verify",
    "please enable javascript",
    "javascript is required",
];

const STRONG_BLOCK_PHRASES: &[&str] =
    &["captcha", "not a robot", "unusual activity", "access denied"];

/// Result of fetching and extracting article content.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published: Option<String>,
    /// "direct", "paywalled", "js_render", "archive", or "error".
    pub source: String,
    pub content_hash: Option<String>,

    pub reading_time_minutes: Option<i64>,
    pub word_count: Option<i64>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub has_code_blocks: bool,
    pub code_languages: Vec<String>,
    pub is_paywalled: bool,
    pub site_name: Option<String>,
    pub extractor_used: String,

    /// Set by the enhanced fetcher when a fallback produced this result.
    pub fallback_used: Option<String>,
    pub archive_source: Option<String>,
    pub original_error: Option<String>,
}

impl FetchResult {
    pub fn has_sufficient_content(&self, min_len: usize) -> bool {
        self.content.len() >= min_len
    }
}

pub struct Fetcher {
    client: Client,
    min_content_length: usize,
}

impl Fetcher {
    pub fn new(timeout_secs: u64, min_content_length: usize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
                 image/apng,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(DESKTOP_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| EstuaryError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            min_content_length,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(30, MIN_CONTENT_LENGTH)
    }

    pub fn min_content_length(&self) -> usize {
        self.min_content_length
    }

    /// Fetch a URL and extract its article content.
    ///
    /// The URL is SSRF-validated first. A paywall or bot-detection page is
    /// not an error: the result comes back tagged `source = "paywalled"`.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult> {
        ssrf::validate_url(url).await?;

        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let final_url = response.url().to_string();
        let body = response.text().await?;

        let mut result = self.extract_content(&final_url, &body);
        if looks_paywalled(&result.content, &final_url) {
            result.source = "paywalled".into();
        }
        Ok(result)
    }

    /// Extractor dispatch: site-specific, then reader-mode, then heuristics.
    pub(crate) fn extract_content(&self, url: &str, body: &str) -> FetchResult {
        if let Some(extracted) = extract::extract_with_site_extractor(url, body) {
            if extracted.content.len() >= self.min_content_length {
                return site_extraction_to_result(url, extracted);
            }
        }

        if let Some(result) = readability::reader_mode(url, body) {
            if result.content.len() >= self.min_content_length {
                return result;
            }
        }

        readability::heuristic(url, body)
    }
}

fn site_extraction_to_result(url: &str, extracted: ExtractedContent) -> FetchResult {
    FetchResult {
        url: extracted.canonical_url.unwrap_or_else(|| url.to_string()),
        title: if extracted.title.is_empty() {
            "Untitled".into()
        } else {
            extracted.title
        },
        content_hash: Some(Article::hash_content(&extracted.content)),
        content: extracted.content,
        author: extracted.author,
        published: extracted.published,
        source: "direct".into(),
        reading_time_minutes: extracted.reading_time_minutes,
        word_count: extracted.word_count,
        categories: extracted.categories,
        tags: extracted.tags,
        featured_image: extracted.featured_image,
        has_code_blocks: extracted.has_code_blocks,
        code_languages: extracted.code_languages,
        is_paywalled: extracted.is_paywalled,
        site_name: extracted.site_name,
        extractor_used: extracted.extractor_used,
        ..Default::default()
    }
}

/// Bot-detection heuristic: several block phrases in a short body, or one
/// strong indicator in a very short body.
pub fn looks_blocked(content: &str) -> bool {
    let content_lower = content.to_lowercase();
    let matches = BLOCK_PHRASES
        .iter()
        .filter(|phrase| content_lower.contains(*phrase))
        .count();

    if matches >= 2 && content.len() < 3000 {
        return true;
    }

    STRONG_BLOCK_PHRASES
        .iter()
        .any(|phrase| content_lower.contains(phrase))
        && content.len() < 2000
}

/// Paywall heuristic: known-paywalled domain with suspiciously short
/// content, or a paywall phrase in a short body, or a bot-detection page.
pub fn looks_paywalled(content: &str, url: &str) -> bool {
    if looks_blocked(content) {
        return true;
    }

    let url_lower = url.to_lowercase();
    if PAYWALLED_DOMAINS.iter().any(|d| url_lower.contains(d)) && content.len() < 1000 {
        return true;
    }

    let content_lower = content.to_lowercase();
    PAYWALL_PHRASES
        .iter()
        .any(|phrase| content_lower.contains(phrase))
        && content.len() < 2000
}

/// Host is on the known-paywalled list.
pub fn is_paywalled_domain(url: &str) -> bool {
    let url_lower = url.to_lowercase();
    PAYWALLED_DOMAINS.iter().any(|d| url_lower.contains(d))
}

/// Content metrics shared by the extractors: word count, reading time, and
/// code-block detection over the text projection of an HTML fragment.
pub fn content_metrics(content: &str) -> (i64, i64, bool, Vec<String>) {
    let text = html::fragment_text(content);
    let words = html::word_count(&text);
    let doc = html::parse_fragment(content);
    (
        words,
        html::reading_time_minutes(words),
        html::has_code_blocks(&doc),
        html::code_languages(&doc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paywall_specificity() {
        let long_body = format!("{} subscribe to continue", "word ".repeat(700));
        assert!(long_body.len() > 3000);
        assert!(!looks_paywalled(&long_body, "https://example.com/a"));

        let short_body = format!("{} subscribe to continue", "word ".repeat(80));
        assert!(short_body.len() < 2000);
        assert!(looks_paywalled(&short_body, "https://example.com/a"));

        let captcha_body = format!("{} captcha", "word ".repeat(80));
        assert!(looks_blocked(&captcha_body));
    }

    #[test]
    fn test_blocked_requires_two_weak_phrases() {
        let one_weak = "please verify something in this short page";
        assert!(!looks_blocked(one_weak));

        let two_weak = "just a moment while we are checking your browser";
        assert!(looks_blocked(two_weak));
    }

    #[test]
    fn test_paywalled_domain_with_short_content() {
        assert!(looks_paywalled(
            "a short teaser",
            "https://www.wsj.com/articles/x"
        ));
        assert!(!looks_paywalled(
            &"full article text ".repeat(100),
            "https://www.wsj.com/articles/x"
        ));
    }

    #[test]
    fn test_extract_content_prefers_site_extractor() {
        let fetcher = Fetcher::with_defaults().unwrap();
        let body = format!(
            "<html><body><h1 id=\"firstHeading\">Topic</h1>\
             <div id=\"mw-content-text\"><p>{}</p></div></body></html>",
            "encyclopedic text ".repeat(60)
        );
        let result = fetcher.extract_content("https://en.wikipedia.org/wiki/Topic", &body);
        assert_eq!(result.extractor_used, "wikipedia");
    }

    #[test]
    fn test_extract_content_falls_back_for_unknown_sites() {
        let fetcher = Fetcher::with_defaults().unwrap();
        let body = format!(
            "<html><head><title>Story | Site</title></head>\
             <body><article><p>{}</p></article></body></html>",
            "long body sentence with plenty of words to extract. ".repeat(30)
        );
        let result = fetcher.extract_content("https://example.com/story", &body);
        assert!(result.content.len() >= 500);
        assert_eq!(result.title, "Story");
    }
}
