//! Embedding gateway
//!
//! Turns text into fixed-dimension vectors via an external embedding
//! service. The one contract the orchestrator depends on: the output is
//! aligned 1:1 with the input, or the whole call fails. Nothing is ever
//! silently dropped or padded.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingsConfig;
use crate::errors::PipelineError;

pub type EmbeddingVector = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, PipelineError>;
    async fn embed_documents(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>, PipelineError>;
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingsConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn request_batch(&self, batch: &[String]) -> Result<Vec<EmbeddingVector>, PipelineError> {
        let request = EmbeddingRequest {
            input: batch,
            model: &self.config.model,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("embedding", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                service: "embedding",
                message: format!("API error {status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("embedding", e))?;

        if parsed.data.len() != batch.len() {
            return Err(PipelineError::Data(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, PipelineError> {
        let input = vec![text.to_string()];
        let mut embeddings = self.request_batch(&input).await?;
        embeddings
            .pop()
            .ok_or_else(|| PipelineError::Data("empty embedding response".into()))
    }

    async fn embed_documents(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let batches: Vec<Vec<String>> = texts
            .chunks(self.config.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        // Batches go out with bounded concurrency; `buffered` yields results
        // in dispatch order, so the flattened output lines up with the input.
        let results: Vec<Vec<EmbeddingVector>> = stream::iter(batches)
            .map(|batch| async move { self.request_batch(&batch).await })
            .buffered(self.config.max_concurrent_batches.max(1))
            .try_collect()
            .await?;

        let embeddings: Vec<EmbeddingVector> = results.into_iter().flatten().collect();
        if embeddings.len() != expected {
            return Err(PipelineError::Data(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Deterministic embedder for tests and keyless local runs. Vectors are
/// derived from a content digest, so identical text always maps to the same
/// unit vector and distinct text almost never collides.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn digest_vector(&self, text: &str) -> EmbeddingVector {
        let digest = Sha256::digest(text.as_bytes());
        let mut vector: EmbeddingVector = (0..self.dimension)
            .map(|i| {
                let byte = digest[(i * 7 + 3) % digest.len()] as usize;
                ((byte * 31 + i) % 251) as f32 / 125.5 - 1.0
            })
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, PipelineError> {
        Ok(self.digest_vector(text))
    }

    async fn embed_documents(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>, PipelineError> {
        Ok(texts.iter().map(|t| self.digest_vector(t)).collect())
    }
}
