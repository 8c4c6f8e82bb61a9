//! LLM provider abstraction.
//!
//! One uniform completion interface over the vendor HTTP APIs, consumed by
//! the summarizer, the clusterer, and the related-links keyword extractor.
//! Providers differ in capabilities (prompt caching, JSON mode) described by
//! a [`Capabilities`] value rather than by separate trait hierarchies.

mod anthropic;
mod google;
mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::{EstuaryError, Result};
use crate::config::Config;

/// Abstract model-capability bucket, mapped per provider to a concrete
/// model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Standard,
    Advanced,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(Self::Fast),
            "standard" => Some(Self::Standard),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Capabilities {
    pub supports_system_prompt: bool,
    pub supports_prompt_caching: bool,
    pub supports_json_mode: bool,
    pub supports_streaming: bool,
    pub max_context_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub user_prompt: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub use_cache: bool,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: None,
            model: None,
            max_tokens: 1024,
            temperature: 0.0,
            use_cache: false,
            json_mode: false,
        }
    }

    pub fn system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Concrete model identifier for a capability tier.
    fn model_for_tier(&self, tier: ModelTier) -> String;

    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse>;

    /// Completion with a stable (system, instruction) prefix and per-call
    /// dynamic content. Providers with prompt caching mark the prefixes
    /// cacheable; this default simply concatenates them.
    async fn complete_with_cacheable_prefix(
        &self,
        system_prompt: &str,
        instruction_prompt: &str,
        dynamic_content: &str,
        model: Option<&str>,
        max_tokens: u32,
    ) -> Result<LlmResponse> {
        let mut request = CompletionRequest::new(format!(
            "{}\n\n{}",
            instruction_prompt, dynamic_content
        ))
        .system(system_prompt)
        .max_tokens(max_tokens);
        request.model = model.map(String::from);
        self.complete(request).await
    }
}

/// Create the preferred provider if its key is configured, otherwise the
/// first of Anthropic, OpenAI, Google with a key. `None` means
/// summarization stays disabled.
pub fn provider_from_config(config: &Config) -> Option<Arc<dyn Provider>> {
    let default_model = config.llm_model.clone();

    if let Some(preferred) = config.llm_provider.as_deref() {
        let key = match preferred {
            "anthropic" => config.anthropic_api_key.clone(),
            "openai" => config.openai_api_key.clone(),
            "google" => config.google_api_key.clone(),
            _ => None,
        };
        if let Some(key) = key {
            return create_provider(preferred, &key, default_model.as_deref()).ok();
        }
    }

    if let Some(key) = &config.anthropic_api_key {
        return create_provider("anthropic", key, default_model.as_deref()).ok();
    }
    if let Some(key) = &config.openai_api_key {
        return create_provider("openai", key, default_model.as_deref()).ok();
    }
    if let Some(key) = &config.google_api_key {
        return create_provider("google", key, default_model.as_deref()).ok();
    }

    info!("No LLM provider API key configured; summarization disabled");
    None
}

pub fn create_provider(
    name: &str,
    api_key: &str,
    default_model: Option<&str>,
) -> Result<Arc<dyn Provider>> {
    match name {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(api_key, default_model)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(api_key, default_model)?)),
        "google" => Ok(Arc::new(GoogleProvider::new(api_key, default_model)?)),
        other => Err(EstuaryError::Provider(format!(
            "Unknown provider: {}. Available: anthropic, openai, google",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_trip() {
        for tier in [ModelTier::Fast, ModelTier::Standard, ModelTier::Advanced] {
            assert_eq!(ModelTier::from_str(tier.as_str()), Some(tier));
        }
        assert!(ModelTier::from_str("turbo").is_none());
    }

    #[test]
    fn test_create_provider_rejects_unknown() {
        assert!(create_provider("acme", "key", None).is_err());
    }

    #[test]
    fn test_factory_order_prefers_anthropic() {
        let config = Config {
            anthropic_api_key: Some("a".into()),
            openai_api_key: Some("b".into()),
            ..test_config()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_factory_honors_preference() {
        let config = Config {
            anthropic_api_key: Some("a".into()),
            google_api_key: Some("g".into()),
            llm_provider: Some("google".into()),
            ..test_config()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.name(), "google");
    }

    #[test]
    fn test_factory_returns_none_without_keys() {
        assert!(provider_from_config(&test_config()).is_none());
    }

    fn test_config() -> Config {
        Config {
            db_path: "articles.db".into(),
            cache_dir: "cache".into(),
            uploads_dir: "uploads".into(),
            max_upload_size_mb: 25,
            anthropic_api_key: None,
            openai_api_key: None,
            google_api_key: None,
            llm_provider: None,
            llm_model: None,
            exa_api_key: None,
            enable_related_links: true,
            enable_js_render: true,
            enable_archive: true,
            js_render_timeout_ms: 30_000,
            archive_max_age_days: 30,
            gmail_client_id: None,
            gmail_client_secret: None,
        }
    }
}
