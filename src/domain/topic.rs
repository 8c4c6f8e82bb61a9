use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A persisted clustering run, queryable for topic trends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    pub id: i64,
    pub topic_label: String,
    pub topic_hash: String,
    pub article_count: i64,
    pub article_ids: Vec<i64>,
    pub clustered_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl TopicEntry {
    /// Normalized label hash so "EU AI Regulation" and "eu ai regulation"
    /// count as the same topic across runs.
    pub fn hash_label(label: &str) -> String {
        let normalized = label.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_hash_normalizes_case_and_whitespace() {
        assert_eq!(
            TopicEntry::hash_label("EU AI Regulation"),
            TopicEntry::hash_label("  eu ai regulation ")
        );
        assert_ne!(
            TopicEntry::hash_label("EU AI Regulation"),
            TopicEntry::hash_label("US AI Regulation")
        );
    }
}
