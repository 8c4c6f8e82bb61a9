//! LLM-powered article summarization.
//!
//! Two-step pipeline: a generation pass produces structured JSON (headline,
//! summary, key points, content type), and a critic pass reviews it for long
//! articles and newsletters. The critic is best-effort; its failure falls
//! back to the first pass. Results are cached per URL with the model tier
//! recorded, and legacy cache records holding full model names are mapped
//! back to tiers.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::cache::TieredCache;
use crate::llm::{ModelTier, Provider};

/// Terms whose presence suggests content worth the standard-tier model.
const TECHNICAL_TERMS: &[&str] = &[
    "algorithm",
    "neural",
    "quantum",
    "blockchain",
    "protocol",
    "cryptographic",
    "machine learning",
    "artificial intelligence",
    "api",
    "infrastructure",
    "architecture",
    "microservices",
    "distributed",
    "consensus",
    "encryption",
    "compiler",
    "semiconductor",
    "genomic",
    "molecular",
    "theorem",
];

/// Article bodies are capped before being sent to the model.
const MAX_CONTENT_CHARS: usize = 15_000;

const SYSTEM_PROMPT: &str = "You are an expert technology journalist writing for software engineers and AI practitioners. Your summaries are clear, direct, and technically informed while remaining accessible.

Core principles:
- Present information directly and factually\u{2014}no meta-language like \"This article explains...\" or \"The author discusses...\"
- Use active voice and simple syntax
- Include technical details when they matter; omit jargon that doesn't add meaning
- Always connect stories to their practical implications for builders and practitioners
- Be skeptical of marketing language and press release hype\u{2014}focus on substance";

const INSTRUCTION_PROMPT: &str = r#"Summarize the article below. Respond with valid JSON only—no other text.

CONTENT TYPE DETECTION:
First, classify the article as one of: news, analysis, tutorial, review, research, newsletter
- news: Announcements, product launches, funding, acquisitions, breaking developments
- analysis: Opinion pieces, commentary, predictions, industry analysis
- tutorial: How-to guides, technical walkthroughs, implementation guides
- review: Product reviews, comparisons, evaluations
- research: Academic papers, technical reports, benchmark studies
- newsletter: Multi-story digests, roundups, curated links

HEADLINE GUIDELINES (8-12 words):
- Lead with the most searchable noun (company name, product, technology)
- Use a strong, active verb
- Include one concrete detail (number, name, or outcome)
- Do NOT repeat the article's original headline verbatim
- Avoid vague words: "new," "big," "major," "revolutionary," "game-changing"
- Avoid clickbait: "You won't believe," "Here's why," "Everything you need to know"

Good: "Anthropic releases Claude 4 with 1M token context window"
Good: "Google open-sources Gemma 3 weights for commercial use"
Bad: "Anthropic announces major new AI model update"
Bad: "New Claude model is a game-changer for developers"

SUMMARY GUIDELINES:
Write 4-6 sentences as flowing prose (no bullet points).

For SINGLE-STORY articles:
- Sentence 1: State the core development—what happened, who did it, when
- Sentences 2-4: Include the most relevant of: technical specs, pricing, availability, limitations, methodology, key findings, competitive context
- Final sentence: Connect to broader implications for software development, AI capabilities, or the industry—but write it as a natural continuation, NOT as "This matters because..." or "This is significant for..."

Good final sentence: "The pricing undercuts GPT-4 by 60%, likely shifting which models developers default to for production workloads."
Bad final sentence: "This is important for developers because it offers a cheaper alternative."

For MULTI-STORY articles (newsletters, roundups):
- Write one paragraph per major story (3-4 sentences each)
- Separate paragraphs with blank lines
- Order by importance, not by original appearance
- Still end with an implications sentence for the most significant story

SPECIAL HANDLING BY CONTENT TYPE:
- analysis/opinion: Note the author's position neutrally (e.g., "argues that," "contends") without editorializing
- tutorial: Preserve the key actionable steps or techniques covered
- review: Include the verdict and primary pros/cons
- research: Note methodology, sample sizes, and any stated limitations
- news (press releases): Be skeptical—distinguish concrete announcements from aspirational claims

ADDITIONAL GUIDELINES:
- If the article contains a notable quote from a primary source that captures the story's essence, include it
- If information conflicts or is disputed, present both sides neutrally
- If content appears truncated or paywalled, summarize only what's available and note the limitation
- Spell out numbers ("8 billion" not "8B") and "percent" (not "%")
- Use active voice and simple verbs ("released" not "has released")
- Omit background readers likely know ("OpenAI is an AI company")

KEY POINTS GUIDELINES:
- 3-5 bullet points with distinct, scannable takeaways
- Include specific facts, numbers, dates, or names
- For multi-story articles, prioritize across all stories by importance

Respond with this exact JSON structure:
{
  "headline": "Your headline here",
  "summary": "Your summary paragraphs here. Use \n\n for paragraph breaks in multi-story summaries.",
  "key_points": ["First point", "Second point", "Third point"],
  "content_type": "news|analysis|tutorial|review|research|newsletter"
}"#;

const CRITIC_PROMPT: &str = r#"Evaluate the following summary against quality standards, make corrections if needed, and write an improved headline.

You will receive the original article title and a JSON summary produced by a first-pass summarizer.

EVALUATION CRITERIA:

1. STRUCTURE:
   - For newsletters/digests: Each story gets its own paragraph, separated by blank lines
   - For single-story articles: 4-6 flowing sentences, no fragmentation
   - Summary length appropriate for content complexity

2. READABILITY:
   - No meta-language ("This article discusses...", "The author explains...")
   - Active voice throughout ("released" not "has been released")
   - Numbers spelled out ("8 billion" not "8B", "percent" not "%")
   - No unnecessary background readers likely know ("OpenAI is an AI company")

3. KEY POINTS:
   - 3-5 distinct takeaways with no overlap
   - Each includes specific facts, numbers, dates, or names
   - For analysis: author's position noted neutrally
   - For tutorials: key actionable steps preserved
   - For reviews: verdict and pros/cons included

4. HEADLINE (write a new one):
   - 8-12 words
   - Lead with most searchable noun (company, product, technology)
   - Strong active verb
   - One concrete detail (number, name, outcome)
   - Must NOT repeat the original article title
   - No vague words: "new," "big," "major," "game-changing"
   - No clickbait patterns

If the summary is already good, keep it unchanged but still write the headline fresh.

Respond with valid JSON only:
{
  "headline": "Your improved headline here",
  "summary": "The revised summary (or original text if no changes needed)",
  "key_points": ["Revised points (or original if no changes needed)"],
  "revisions_made": ["List of specific changes, or empty array if none"]
}"#;

/// Structured article summary.
#[derive(Debug, Clone)]
pub struct Summary {
    pub title: String,
    pub one_liner: String,
    pub full_summary: String,
    pub key_points: Vec<String>,
    pub model_used: ModelTier,
    pub cached: bool,
}

pub struct Summarizer {
    provider: Arc<dyn Provider>,
    cache: Option<Arc<TieredCache>>,
    default_model: ModelTier,
    critic_enabled: bool,
}

impl Summarizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        cache: Option<Arc<TieredCache>>,
        critic_enabled: bool,
    ) -> Self {
        Self {
            provider,
            cache,
            default_model: ModelTier::Fast,
            critic_enabled,
        }
    }

    pub fn with_default_model(mut self, tier: ModelTier) -> Self {
        self.default_model = tier;
        self
    }

    /// Produce a structured summary for an article.
    pub async fn summarize(
        &self,
        content: &str,
        url: &str,
        title: &str,
        force_model: Option<ModelTier>,
    ) -> Result<Summary> {
        let cache_key = format!("summary:{}", url);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key) {
                if let Some(summary) = self.summary_from_cache(&cached, title) {
                    debug!("Summary cache hit for {}", url);
                    return Ok(summary);
                }
            }
        }

        let tier = force_model.unwrap_or_else(|| self.select_model(content));
        let model = self.provider.model_for_tier(tier);
        let article_content = build_article_content(content, title, url);

        let step1 = self
            .provider
            .complete_with_cacheable_prefix(
                SYSTEM_PROMPT,
                INSTRUCTION_PROMPT,
                &article_content,
                Some(&model),
                1024,
            )
            .await?;

        let content_type = extract_content_type(&step1.text);
        let final_text = if self.critic_enabled
            && should_use_critic(content, content_type.as_deref())
        {
            match self.run_critic(&step1.text, title, url).await {
                Some(revised) => revised,
                None => step1.text.clone(),
            }
        } else {
            step1.text.clone()
        };

        let summary = parse_response(&final_text, tier, title);

        if let Some(cache) = &self.cache {
            cache.set(
                &cache_key,
                json!({
                    "title": summary.title,
                    "one_liner": summary.one_liner,
                    "full_summary": summary.full_summary,
                    "key_points": summary.key_points,
                    "model_used": summary.model_used.as_str(),
                }),
                None,
            );
        }

        Ok(summary)
    }

    fn summary_from_cache(&self, cached: &Value, title: &str) -> Option<Summary> {
        let object = cached.as_object()?;
        let model_name = object
            .get("model_used")
            .and_then(Value::as_str)
            .unwrap_or(self.default_model.as_str());
        let tier = ModelTier::from_str(model_name)
            .unwrap_or_else(|| map_legacy_model_to_tier(model_name));

        Some(Summary {
            title: object
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(title)
                .to_string(),
            one_liner: object
                .get("one_liner")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            full_summary: object
                .get("full_summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            key_points: object
                .get("key_points")
                .and_then(Value::as_array)
                .map(|points| {
                    points
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            model_used: tier,
            cached: true,
        })
    }

    /// Long or technical content earns the standard tier; everything else
    /// uses the configured default.
    fn select_model(&self, content: &str) -> ModelTier {
        if word_count(content) > 2000 {
            return ModelTier::Standard;
        }

        let content_lower = content.to_lowercase();
        let technical_count = TECHNICAL_TERMS
            .iter()
            .filter(|term| content_lower.contains(*term))
            .count();
        if technical_count > 2 {
            return ModelTier::Standard;
        }

        self.default_model
    }

    /// Critic pass: evaluate and revise step-1 output on the fast tier.
    /// Returns None on any failure so the caller keeps the original.
    async fn run_critic(&self, step1_text: &str, title: &str, url: &str) -> Option<String> {
        let dynamic = format!(
            "Original article title: {}\nURL: {}\n\nFirst-pass summary:\n{}",
            title, url, step1_text
        );
        let model = self.provider.model_for_tier(ModelTier::Fast);

        let response = match self
            .provider
            .complete_with_cacheable_prefix(SYSTEM_PROMPT, CRITIC_PROMPT, &dynamic, Some(&model), 1024)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Critic step failed, using original summary: {}", e);
                return None;
            }
        };

        // The critic must produce parseable JSON to be trusted.
        let data: Value = match serde_json::from_str(&strip_code_fences(&response.text)) {
            Ok(data) => data,
            Err(e) => {
                warn!("Critic returned unparseable JSON, using original summary: {}", e);
                return None;
            }
        };

        match data.get("revisions_made").and_then(Value::as_array) {
            Some(revisions) if !revisions.is_empty() => {
                info!("Critic made {} revision(s)", revisions.len());
            }
            _ => info!("Critic: no revisions to summary, headline updated"),
        }

        Some(response.text)
    }
}

fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Dynamic prompt section: title, URL, and the capped article body.
fn build_article_content(content: &str, title: &str, url: &str) -> String {
    let title_line = if title.is_empty() {
        String::new()
    } else {
        format!("Original title: {}\n", title)
    };
    let url_line = if url.is_empty() {
        String::new()
    } else {
        format!("URL: {}\n", url)
    };

    let mut truncated: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    if content.chars().count() > MAX_CONTENT_CHARS {
        truncated.push_str("\n\n[Content truncated...]");
    }

    format!("{}{}\nArticle:\n{}", title_line, url_line, truncated)
}

/// Strip a surrounding markdown code fence, if present.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let end = if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.len() - 1
    } else {
        lines.len()
    };
    lines[1..end].join("\n")
}

fn extract_content_type(text: &str) -> Option<String> {
    let data: Value = serde_json::from_str(&strip_code_fences(text)).ok()?;
    data.get("content_type")
        .and_then(Value::as_str)
        .map(String::from)
}

/// The critic runs for long articles and multi-story newsletters.
fn should_use_critic(content: &str, content_type: Option<&str>) -> bool {
    word_count(content) > 2000 || content_type == Some("newsletter")
}

fn parse_response(text: &str, tier: ModelTier, title: &str) -> Summary {
    let mut headline = String::new();
    let mut summary_text = String::new();
    let mut key_points: Vec<String> = Vec::new();

    if let Ok(data) = serde_json::from_str::<Value>(&strip_code_fences(text)) {
        headline = data
            .get("headline")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        summary_text = data
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        key_points = data
            .get("key_points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|p| match p {
                        Value::String(s) if !s.is_empty() => Some(s.clone()),
                        Value::String(_) => None,
                        other => Some(other.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();
    }

    if headline.chars().count() > 200 {
        headline = headline.chars().take(200).collect();
    }
    key_points.truncate(5);

    if summary_text.is_empty() {
        summary_text = strip_markdown(text);
    }
    if headline.is_empty() {
        headline = match text.split('.').next() {
            Some(sentence) if !sentence.trim().is_empty() => {
                format!("{}.", strip_markdown(sentence))
            }
            _ => strip_markdown(&text.chars().take(150).collect::<String>()),
        };
    }

    Summary {
        title: title.to_string(),
        one_liner: headline,
        full_summary: summary_text,
        key_points,
        model_used: tier,
        cached: false,
    }
}

fn strip_markdown(s: &str) -> String {
    let mut s = s.trim();
    while let Some(stripped) = s.strip_prefix('#') {
        s = stripped.trim_start();
    }
    s.replace("**", "").trim().to_string()
}

/// Map legacy cached model names to tiers. The substring rules must stay
/// stable so pre-migration cache entries keep resolving.
pub fn map_legacy_model_to_tier(model_name: &str) -> ModelTier {
    let model_lower = model_name.to_lowercase();
    if model_lower.contains("haiku") || model_lower.contains("flash") {
        return ModelTier::Fast;
    }
    // "-mini" rather than "mini" so "gemini" stays out of the fast tier.
    if model_lower.contains("-mini") {
        return ModelTier::Fast;
    }
    ModelTier::Standard
}
