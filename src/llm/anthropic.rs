//! Anthropic Claude adapter with prompt caching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Capabilities, CompletionRequest, LlmResponse, ModelTier, Provider};
use crate::app::{EstuaryError, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const TIER_MODELS: &[(ModelTier, &str)] = &[
    (ModelTier::Fast, "claude-haiku-4-5-20251001"),
    (ModelTier::Standard, "claude-sonnet-4-5-20250514"),
    (ModelTier::Advanced, "claude-opus-4-5-20251218"),
];

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("haiku", "claude-haiku-4-5-20251001"),
    ("sonnet", "claude-sonnet-4-5-20250514"),
    ("opus", "claude-opus-4-5-20251218"),
    ("claude-haiku-4-5", "claude-haiku-4-5-20251001"),
    ("claude-sonnet-4-5", "claude-sonnet-4-5-20250514"),
    ("claude-opus-4-5", "claude-opus-4-5-20251218"),
];

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, default_model: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EstuaryError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            default_model: resolve_model(default_model.unwrap_or("claude-haiku-4-5")),
        })
    }

    async fn call(&self, body: Value, model: String) -> Result<LlmResponse> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(EstuaryError::Provider(format!(
                "Anthropic API error ({}): {}",
                status, message
            )));
        }

        let text = payload
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(LlmResponse {
            text,
            model,
            input_tokens: payload
                .pointer("/usage/input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: payload
                .pointer("/usage/output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            cached_tokens: payload
                .pointer("/usage/cache_read_input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            metadata: json!({
                "stop_reason": payload.pointer("/stop_reason"),
                "provider": "anthropic",
            }),
        })
    }
}

fn resolve_model(model: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model)
        .map(|(_, resolved)| resolved.to_string())
        .unwrap_or_else(|| model.to_string())
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_system_prompt: true,
            supports_prompt_caching: true,
            // No native JSON mode; prompts carry the format contract.
            supports_json_mode: false,
            supports_streaming: true,
            max_context_tokens: 200_000,
        }
    }

    fn model_for_tier(&self, tier: ModelTier) -> String {
        let (_, model) = TIER_MODELS
            .iter()
            .find(|(t, _)| *t == tier)
            .unwrap_or(&TIER_MODELS[0]);
        model.to_string()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse> {
        let model = request
            .model
            .as_deref()
            .map(resolve_model)
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": [{"role": "user", "content": request.user_prompt}],
        });

        if let Some(system) = &request.system_prompt {
            body["system"] = if request.use_cache {
                json!([{
                    "type": "text",
                    "text": system,
                    "cache_control": {"type": "ephemeral"},
                }])
            } else {
                json!(system)
            };
        }
        if request.temperature > 0.0 {
            body["temperature"] = json!(request.temperature);
        }

        self.call(body, model).await
    }

    /// Multi-part caching: system and instruction blocks are marked
    /// cacheable; the per-article content is not.
    async fn complete_with_cacheable_prefix(
        &self,
        system_prompt: &str,
        instruction_prompt: &str,
        dynamic_content: &str,
        model: Option<&str>,
        max_tokens: u32,
    ) -> Result<LlmResponse> {
        let model = model
            .map(resolve_model)
            .unwrap_or_else(|| self.default_model.clone());

        let body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": [{
                "type": "text",
                "text": system_prompt,
                "cache_control": {"type": "ephemeral"},
            }],
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": instruction_prompt,
                        "cache_control": {"type": "ephemeral"},
                    },
                    {"type": "text", "text": dynamic_content},
                ],
            }],
        });

        self.call(body, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(resolve_model("haiku"), "claude-haiku-4-5-20251001");
        assert_eq!(resolve_model("claude-sonnet-4-5"), "claude-sonnet-4-5-20250514");
        assert_eq!(resolve_model("custom-model"), "custom-model");
    }

    #[test]
    fn test_tier_table() {
        let provider = AnthropicProvider::new("key", None).unwrap();
        assert_eq!(
            provider.model_for_tier(ModelTier::Fast),
            "claude-haiku-4-5-20251001"
        );
        assert_eq!(
            provider.model_for_tier(ModelTier::Standard),
            "claude-sonnet-4-5-20250514"
        );
        assert!(provider.capabilities().supports_prompt_caching);
    }
}
