//! Generation gateway
//!
//! Sends a finished prompt to the external text-generation service and
//! returns the completion. A transport or service failure is an explicit
//! error, never silently empty text; the orchestrator decides what the
//! caller sees.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::errors::PipelineError;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, PipelineError>;
}

/// Client for a text-generation-inference style endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String, PipelineError> {
        let payload = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": max_new_tokens,
                "temperature": self.config.temperature,
                "do_sample": true,
                "top_p": self.config.top_p,
                "repetition_penalty": self.config.repetition_penalty,
            }
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("generation", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                service: "generation",
                message: format!("API error {status}: {body}"),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("generation", e))?;

        let generated = generated_text(&body)?;
        Ok(strip_prompt_echo(generated, prompt).to_string())
    }
}

/// The service answers either `[{"generated_text": ...}]` or
/// `{"generated_text": ...}` depending on deployment.
fn generated_text(body: &Value) -> Result<&str, PipelineError> {
    body.get(0)
        .and_then(|v| v.get("generated_text"))
        .or_else(|| body.get("generated_text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PipelineError::Data("generation response carries no generated_text".into())
        })
}

/// Some backends return prompt and completion concatenated; keep only the
/// completion in that case.
fn strip_prompt_echo<'a>(text: &'a str, prompt: &str) -> &'a str {
    text.strip_prefix(prompt).unwrap_or(text).trim()
}

/// Canned generator for tests and keyless local runs.
pub struct MockGenerator {
    answer: String,
}

impl MockGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new("Based on the provided excerpts, this is a canned answer from the mock generation backend.")
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _max_new_tokens: usize,
    ) -> Result<String, PipelineError> {
        Ok(self.answer.clone())
    }
}
