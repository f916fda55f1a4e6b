//! LLM Gateway (C3): a single synchronous `generate` contract with a fixed
//! timeout. Provider internals (local model loading, ONNX, llama.cpp) are
//! out of scope — callers get an HTTP-provider implementation trimmed to
//! the contract this crate actually calls.

mod http_provider;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;

pub use http_provider::HttpLlmProvider;

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            stop_sequences: Vec::new(),
        }
    }
}

/// A provider capable of a single blocking-style generation call. No
/// internal retries — the caller (the timeout wrapper below) owns that
/// policy.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_raw(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CoreError>;
}

/// The gateway callers actually hold: wraps any `LlmProvider` with the fixed
/// timeout → `LLMTimeout`/`LLMUnavailable` mapping spec'd for C3.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// `generate(prompt, options) -> string`, called at most once per
    /// caller-issued request — no internal retry loop.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CoreError> {
        match tokio::time::timeout(self.timeout, self.provider.generate_raw(prompt, options))
            .await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "LLM generation failed");
                Err(CoreError::LLMUnavailable(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "LLM generation timed out");
                Err(CoreError::LLMTimeout(self.timeout.as_secs()))
            }
        }
    }
}
