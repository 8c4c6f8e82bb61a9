//! Google Gemini adapter with JSON output and a very large context window.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Capabilities, CompletionRequest, LlmResponse, ModelTier, Provider};
use crate::app::{EstuaryError, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const TIER_MODELS: &[(ModelTier, &str)] = &[
    (ModelTier::Fast, "gemini-3.0-flash"),
    (ModelTier::Standard, "gemini-3.0-pro"),
    (ModelTier::Advanced, "gemini-3.0-pro"),
];

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("flash", "gemini-3.0-flash"),
    ("pro", "gemini-3.0-pro"),
    ("gemini-flash", "gemini-3.0-flash"),
    ("gemini-pro", "gemini-3.0-pro"),
    ("fast", "gemini-3.0-flash"),
    ("standard", "gemini-3.0-pro"),
];

pub struct GoogleProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl GoogleProvider {
    pub fn new(api_key: &str, default_model: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EstuaryError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            default_model: resolve_model(default_model.unwrap_or("gemini-3.0-flash")),
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
impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_system_prompt: true,
            supports_prompt_caching: false,
            supports_json_mode: true,
            supports_streaming: true,
            max_context_tokens: 1_000_000,
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

        let mut generation_config = json!({
            "maxOutputTokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({
            "contents": [{"parts": [{"text": request.user_prompt}]}],
            "generationConfig": generation_config,
        });
        if let Some(system) = &request.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let url = format!("{}/{}:generateContent?key={}", API_BASE, model, self.api_key);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(EstuaryError::Provider(format!(
                "Google API error ({}): {}",
                status, message
            )));
        }

        Ok(LlmResponse {
            text: payload
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            model,
            input_tokens: payload
                .pointer("/usageMetadata/promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: payload
                .pointer("/usageMetadata/candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            cached_tokens: 0,
            metadata: json!({"provider": "google"}),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(resolve_model("flash"), "gemini-3.0-flash");
        assert_eq!(resolve_model("gemini-2.0-flash"), "gemini-2.0-flash");
    }

    #[test]
    fn test_long_context_capability() {
        let provider = GoogleProvider::new("key", None).unwrap();
        assert_eq!(provider.capabilities().max_context_tokens, 1_000_000);
        assert_eq!(provider.model_for_tier(ModelTier::Fast), "gemini-3.0-flash");
    }
}
