use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content-type tag for library items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Url,
    Pdf,
    Docx,
    Txt,
    Md,
    Html,
    Newsletter,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Html => "html",
            Self::Newsletter => "newsletter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "url" => Some(Self::Url),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            "html" => Some(Self::Html),
            "newsletter" => Some(Self::Newsletter),
            _ => None,
        }
    }

    /// Map an uploaded file's extension to its content kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Md),
            "html" | "htm" => Some(Self::Html),
            "eml" => Some(Self::Newsletter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    /// Owning user for library items; None for shared RSS articles.
    pub user_id: Option<i64>,
    pub url: String,
    /// Underlying publisher URL for aggregator-derived articles.
    pub source_url: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub summary_short: Option<String>,
    pub summary_full: Option<String>,
    pub key_points: Vec<String>,
    pub model_used: Option<String>,
    pub summarized_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_bookmarked: bool,
    pub bookmarked_at: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub reading_time_minutes: Option<i64>,
    pub word_count: Option<i64>,
    pub featured_image: Option<String>,
    pub has_code_blocks: bool,
    pub code_languages: Vec<String>,
    pub site_name: Option<String>,
    pub categories: Vec<String>,
    pub is_paywalled: bool,
    pub extractor_used: Option<String>,
    pub extracted_keywords: Vec<String>,
    pub related_links: Option<serde_json::Value>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Short content hash used for cross-feed deduplication.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }

    /// Effective ordering timestamp: published, falling back to created.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// Fields supplied when inserting an article.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub feed_id: i64,
    pub user_id: Option<i64>,
    pub url: String,
    pub source_url: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub reading_time_minutes: Option<i64>,
    pub word_count: Option<i64>,
    pub featured_image: Option<String>,
    pub has_code_blocks: bool,
    pub code_languages: Vec<String>,
    pub site_name: Option<String>,
    pub categories: Vec<String>,
    pub is_paywalled: bool,
    pub extractor_used: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl NewArticle {
    pub fn new(feed_id: i64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            feed_id,
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.content_hash = Some(Article::hash_content(&content));
        self.content = Some(content);
        self
    }
}

/// Filters for article listings.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub feed_id: Option<i64>,
    pub unread_only: bool,
    pub bookmarked_only: bool,
    pub summarized: Option<bool>,
    pub content_type: Option<String>,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let h1 = Article::hash_content("the same body");
        let h2 = Article::hash_content("the same body");
        let h3 = Article::hash_content("a different body");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 16);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_kind_from_extension() {
        assert_eq!(ContentKind::from_extension("PDF"), Some(ContentKind::Pdf));
        assert_eq!(ContentKind::from_extension("markdown"), Some(ContentKind::Md));
        assert_eq!(ContentKind::from_extension("htm"), Some(ContentKind::Html));
        assert_eq!(ContentKind::from_extension("eml"), Some(ContentKind::Newsletter));
        assert_eq!(ContentKind::from_extension("exe"), None);
    }

    #[test]
    fn test_with_content_sets_hash() {
        let article = NewArticle::new(1, "https://example.com/a", "A").with_content("body text");
        assert_eq!(
            article.content_hash.as_deref(),
            Some(Article::hash_content("body text").as_str())
        );
    }
}
