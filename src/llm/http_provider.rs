//! OpenAI-compatible HTTP provider: a single chat-completions shape that
//! works against any compatible endpoint. Callers point `base_url` at
//! whichever compatible endpoint they run.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::{GenerationOptions, LlmProvider};
use crate::error::CoreError;

pub struct HttpLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .build()
            .expect("HTTP client configuration is valid");

        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, CoreError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::LLMUnavailable(format!("reading response from {endpoint}: {e}")))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(CoreError::LLMUnavailable(format!(
                "{endpoint} returned HTML instead of JSON (HTTP {status}): {preview}"
            )));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            CoreError::LLMUnavailable(format!(
                "failed to parse JSON from {endpoint} (HTTP {status}): {e}. Body: {preview}"
            ))
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn generate_raw(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CoreError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let messages = vec![ChatMessage {
            role: "user",
            content: prompt,
        }];

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stop": options.stop_sequences,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::LLMUnavailable(format!("request to {endpoint} failed: {e}")))?;

        let parsed: ChatCompletionResponse = Self::parse_json_response(response, &endpoint).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoreError::LLMUnavailable("empty choices in response".to_string()))
    }
}
