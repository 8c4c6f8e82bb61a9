//! Topic clustering: group a set of articles into labeled topics with one
//! fast-tier LLM call, cached by the article-id set.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::app::Result;
use crate::cache::TieredCache;
use crate::domain::Article;
use crate::llm::{CompletionRequest, ModelTier, Provider};

const CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct Topic {
    pub id: String,
    pub label: String,
    pub article_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct ClusteringResult {
    pub topics: Vec<Topic>,
    pub cached: bool,
}

pub struct Clusterer {
    provider: Arc<dyn Provider>,
    cache: Option<Arc<TieredCache>>,
}

impl Clusterer {
    pub fn new(provider: Arc<dyn Provider>, cache: Option<Arc<TieredCache>>) -> Self {
        Self { provider, cache }
    }

    pub async fn cluster(&self, articles: &[Article]) -> Result<ClusteringResult> {
        if articles.len() < 2 {
            return Ok(single_group(articles));
        }

        // Aim for 3-5 articles per cluster.
        let n = articles.len();
        let min_clusters = (n / 5).max(2);
        let max_clusters = (min_clusters + 2).max(n / 3).max(10);

        let cache_key = cache_key(articles);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key) {
                if let Some(topics) = topics_from_cache(&cached) {
                    debug!("Clustering cache hit");
                    return Ok(ClusteringResult {
                        topics,
                        cached: true,
                    });
                }
            }
        }

        let prompt = build_prompt(articles, min_clusters, max_clusters);
        let model = self.provider.model_for_tier(ModelTier::Fast);
        let response = self
            .provider
            .complete(CompletionRequest::new(prompt).model(model))
            .await?;

        let result = parse_response(&response.text, articles);

        if let Some(cache) = &self.cache {
            if !result.topics.is_empty() {
                let payload = json!({
                    "topics": result
                        .topics
                        .iter()
                        .map(|t| {
                            json!({"id": t.id, "label": t.label, "article_ids": t.article_ids})
                        })
                        .collect::<Vec<_>>(),
                });
                cache.set(&cache_key, payload, Some(CACHE_TTL_SECS));
            }
        }

        Ok(result)
    }
}

fn single_group(articles: &[Article]) -> ClusteringResult {
    ClusteringResult {
        topics: vec![Topic {
            id: "all".into(),
            label: "All Articles".into(),
            article_ids: articles.iter().map(|a| a.id).collect(),
        }],
        cached: false,
    }
}

/// Cache key over the sorted article-id set, so ordering does not matter.
fn cache_key(articles: &[Article]) -> String {
    let mut ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
    ids.sort_unstable();
    let id_str = ids
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let mut hasher = Sha256::new();
    hasher.update(id_str.as_bytes());
    format!("clustering:{}", &hex::encode(hasher.finalize())[..16])
}

fn build_prompt(articles: &[Article], min_clusters: usize, max_clusters: usize) -> String {
    let article_lines: Vec<String> = articles
        .iter()
        .map(|article| {
            let description = article
                .summary_short
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    article.content.as_ref().map(|c| {
                        let prefix: String = c.chars().take(150).collect();
                        format!("{}...", prefix)
                    })
                })
                .unwrap_or_default();
            format!("[id={}] \"{}\" - {}", article.id, article.title, description)
        })
        .collect();

    format!(
        r#"Analyze these article titles and summaries. Group them into {min}-{max} specific topic clusters.

Articles:
{articles}

Return your response as valid JSON with this exact structure:
{{
  "topics": [
    {{"label": "Topic Name", "article_ids": [1, 2, 3]}}
  ]
}}

Rules:
- Create SPECIFIC, NARROW topics - not broad categories
- BAD: "Technology" or "Politics" (too broad)
- GOOD: "OpenAI GPT Models", "EU AI Regulation", "Tesla Earnings" (specific)
- Each topic should ideally have 2-5 articles
- If a topic would have 6+ articles, split it into more specific subtopics
- Every article must be assigned to exactly one topic
- Use short but specific topic labels (2-5 words)
- If an article doesn't fit any group, put it in "Other" topic
- Return ONLY the JSON, no other text"#,
        min = min_clusters,
        max = max_clusters,
        articles = article_lines.join("\n"),
    )
}

fn topics_from_cache(cached: &Value) -> Option<Vec<Topic>> {
    let topics: Vec<Topic> = cached
        .get("topics")?
        .as_array()?
        .iter()
        .filter_map(|t| {
            Some(Topic {
                id: t.get("id")?.as_str()?.to_string(),
                label: t.get("label")?.as_str()?.to_string(),
                article_ids: t
                    .get("article_ids")?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_i64)
                    .collect(),
            })
        })
        .collect();
    (!topics.is_empty()).then_some(topics)
}

/// Parse the model's JSON, keeping only ids that exist in the input and are
/// not yet assigned; leftovers land in an "Other" topic.
fn parse_response(text: &str, articles: &[Article]) -> ClusteringResult {
    let cleaned = strip_code_fences(text);
    let Ok(data) = serde_json::from_str::<Value>(&cleaned) else {
        return single_group(articles);
    };

    let all_ids: HashSet<i64> = articles.iter().map(|a| a.id).collect();
    let mut assigned: HashSet<i64> = HashSet::new();
    let mut topics = Vec::new();

    if let Some(raw_topics) = data.get("topics").and_then(Value::as_array) {
        for (i, topic_data) in raw_topics.iter().enumerate() {
            let label = topic_data
                .get("label")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("Topic {}", i + 1));
            let valid_ids: Vec<i64> = topic_data
                .get("article_ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_i64)
                        .filter(|id| all_ids.contains(id) && !assigned.contains(id))
                        .collect()
                })
                .unwrap_or_default();

            if !valid_ids.is_empty() {
                assigned.extend(valid_ids.iter().copied());
                topics.push(Topic {
                    id: format!("topic_{}", i),
                    label,
                    article_ids: valid_ids,
                });
            }
        }
    }

    let unassigned: Vec<i64> = articles
        .iter()
        .map(|a| a.id)
        .filter(|id| !assigned.contains(id))
        .collect();
    if !unassigned.is_empty() {
        topics.push(Topic {
            id: "other".into(),
            label: "Other".into(),
            article_ids: unassigned,
        });
    }

    ClusteringResult {
        topics,
        cached: false,
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let start = trimmed.find("```").unwrap_or(0);
    let end = trimmed.rfind("```").unwrap_or(trimmed.len());
    if start == end {
        return trimmed.to_string();
    }
    let inner = &trimmed[start + 3..end];
    inner
        .strip_prefix("json")
        .unwrap_or(inner)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(id: i64, title: &str) -> Article {
        Article {
            id,
            feed_id: 1,
            user_id: None,
            url: format!("https://example.com/{}", id),
            source_url: None,
            title: title.into(),
            author: None,
            content: Some("body".into()),
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

    #[test]
    fn test_fewer_than_two_articles_single_group() {
        let articles = vec![article(1, "Only")];
        let result = single_group(&articles);
        assert_eq!(result.topics.len(), 1);
        assert_eq!(result.topics[0].label, "All Articles");
        assert_eq!(result.topics[0].article_ids, vec![1]);
    }

    #[test]
    fn test_cache_key_ignores_order() {
        let a = vec![article(1, "a"), article(2, "b"), article(3, "c")];
        let b = vec![article(3, "c"), article(1, "a"), article(2, "b")];
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn test_parse_filters_unknown_and_duplicate_ids() {
        let articles = vec![article(1, "a"), article(2, "b"), article(3, "c")];
        let response = r#"{"topics": [
            {"label": "First", "article_ids": [1, 99, 2]},
            {"label": "Second", "article_ids": [2, 3]}
        ]}"#;
        let result = parse_response(response, &articles);

        assert_eq!(result.topics.len(), 2);
        assert_eq!(result.topics[0].article_ids, vec![1, 2]);
        // id 2 already assigned, only 3 remains.
        assert_eq!(result.topics[1].article_ids, vec![3]);
    }

    #[test]
    fn test_parse_assigns_leftovers_to_other() {
        let articles = vec![article(1, "a"), article(2, "b"), article(3, "c")];
        let response = r#"{"topics": [{"label": "First", "article_ids": [1]}]}"#;
        let result = parse_response(response, &articles);

        let other = result.topics.last().unwrap();
        assert_eq!(other.label, "Other");
        assert_eq!(other.article_ids, vec![2, 3]);
    }

    #[test]
    fn test_parse_garbage_falls_back_to_single_group() {
        let articles = vec![article(1, "a"), article(2, "b")];
        let result = parse_response("not json at all", &articles);
        assert_eq!(result.topics.len(), 1);
        assert_eq!(result.topics[0].label, "All Articles");
    }

    #[test]
    fn test_parse_fenced_response() {
        let articles = vec![article(1, "a"), article(2, "b")];
        let response = "```json\n{\"topics\": [{\"label\": \"Pair\", \"article_ids\": [1, 2]}]}\n```";
        let result = parse_response(response, &articles);
        assert_eq!(result.topics.len(), 1);
        assert_eq!(result.topics[0].label, "Pair");
    }
}
