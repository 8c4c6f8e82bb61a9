//! Site-specific content extractors.
//!
//! A closed, build-time registry of handlers, each declaring the host
//! suffixes it covers and a pure `(url, html) -> ExtractedContent` function.
//! The first matching handler wins; callers fall back to reader-mode
//! extraction when none matches or the result is too thin. Extractors never
//! touch the network.

pub mod html;

mod bloomberg;
mod github;
mod medium;
mod substack;
mod twitter;
mod wikipedia;
mod youtube;

/// Rich extraction result shared by every site extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub title: String,
    /// Cleaned article body as HTML.
    pub content: String,
    pub author: Option<String>,
    /// ISO-format publication date as found in the page.
    pub published: Option<String>,

    pub reading_time_minutes: Option<i64>,
    pub word_count: Option<i64>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,

    pub featured_image: Option<String>,
    pub images: Vec<String>,
    pub has_video: bool,
    pub video_embed_url: Option<String>,

    pub is_paywalled: bool,
    pub has_code_blocks: bool,
    pub code_languages: Vec<String>,

    pub site_name: Option<String>,
    pub canonical_url: Option<String>,
    pub extractor_used: String,
}

impl ExtractedContent {
    /// Fill word count and reading time from the content's text projection,
    /// keeping values an extractor already supplied.
    pub(crate) fn with_text_metrics(mut self) -> Self {
        let text = html::fragment_text(&self.content);
        let words = html::word_count(&text);
        if self.word_count.is_none() {
            self.word_count = Some(words);
        }
        if self.reading_time_minutes.is_none() {
            self.reading_time_minutes = Some(html::reading_time_minutes(words));
        }
        self
    }
}

struct SiteExtractor {
    hosts: &'static [&'static str],
    extract: fn(&str, &str) -> ExtractedContent,
}

/// Registry in dispatch order; the first host match wins.
const SITE_EXTRACTORS: &[SiteExtractor] = &[
    SiteExtractor {
        hosts: &[
            "medium.com",
            "towardsdatascience.com",
            "betterprogramming.pub",
            "levelup.gitconnected.com",
            "javascript.plainenglish.io",
        ],
        extract: medium::extract,
    },
    SiteExtractor {
        hosts: &["substack.com"],
        extract: substack::extract,
    },
    SiteExtractor {
        hosts: &["github.com"],
        extract: github::extract,
    },
    SiteExtractor {
        hosts: &["youtube.com", "youtu.be"],
        extract: youtube::extract,
    },
    SiteExtractor {
        hosts: &["twitter.com", "x.com"],
        extract: twitter::extract,
    },
    SiteExtractor {
        hosts: &["wikipedia.org", "wikimedia.org"],
        extract: wikipedia::extract,
    },
    SiteExtractor {
        hosts: &["bloomberg.com"],
        extract: bloomberg::extract,
    },
];

fn host_matches(url: &str, hosts: &[&str]) -> bool {
    let url_lower = url.to_lowercase();
    hosts.iter().any(|host| url_lower.contains(host))
}

/// Run the first matching site extractor, if any.
pub fn extract_with_site_extractor(url: &str, html: &str) -> Option<ExtractedContent> {
    let handler = SITE_EXTRACTORS
        .iter()
        .find(|e| host_matches(url, e.hosts))?;
    Some((handler.extract)(url, html))
}

pub fn has_site_extractor(url: &str) -> bool {
    SITE_EXTRACTORS.iter().any(|e| host_matches(url, e.hosts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch() {
        assert!(has_site_extractor("https://medium.com/@a/post"));
        assert!(has_site_extractor("https://github.com/rust-lang/rust/releases/tag/1.80.0"));
        assert!(has_site_extractor("https://en.wikipedia.org/wiki/Rust"));
        assert!(!has_site_extractor("https://example.com/article"));
    }

    #[test]
    fn test_unknown_host_returns_none() {
        assert!(extract_with_site_extractor("https://example.com/a", "<html></html>").is_none());
    }
}
