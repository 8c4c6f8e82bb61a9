//! OpenAI GPT adapter with JSON mode.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Capabilities, CompletionRequest, LlmResponse, ModelTier, Provider};
use crate::app::{EstuaryError, Result};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

const TIER_MODELS: &[(ModelTier, &str)] = &[
    (ModelTier::Fast, "gpt-5.2-mini"),
    (ModelTier::Standard, "gpt-5.2"),
    (ModelTier::Advanced, "gpt-5.2"),
];

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt5", "gpt-5.2"),
    ("gpt5-mini", "gpt-5.2-mini"),
    ("gpt-5", "gpt-5.2"),
    ("fast", "gpt-5.2-mini"),
    ("standard", "gpt-5.2"),
    ("gpt4", "gpt-4o"),
    ("gpt4-mini", "gpt-4o-mini"),
    ("gpt-4", "gpt-4o"),
];

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, default_model: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EstuaryError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            default_model: resolve_model(default_model.unwrap_or("gpt-5.2-mini")),
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
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_system_prompt: true,
            supports_prompt_caching: false,
            supports_json_mode: true,
            supports_streaming: true,
            max_context_tokens: 128_000,
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

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user_prompt}));

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
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
                "OpenAI API error ({}): {}",
                status, message
            )));
        }

        Ok(LlmResponse {
            text: payload
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            model,
            input_tokens: payload
                .pointer("/usage/prompt_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: payload
                .pointer("/usage/completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            cached_tokens: 0,
            metadata: json!({
                "finish_reason": payload.pointer("/choices/0/finish_reason"),
                "provider": "openai",
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(resolve_model("gpt4-mini"), "gpt-4o-mini");
        assert_eq!(resolve_model("fast"), "gpt-5.2-mini");
        assert_eq!(resolve_model("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn test_capabilities_and_tiers() {
        let provider = OpenAiProvider::new("key", None).unwrap();
        assert!(provider.capabilities().supports_json_mode);
        assert!(!provider.capabilities().supports_prompt_caching);
        assert_eq!(provider.model_for_tier(ModelTier::Fast), "gpt-5.2-mini");
        assert_eq!(provider.model_for_tier(ModelTier::Advanced), "gpt-5.2");
    }
}
