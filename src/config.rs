use ::config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub embeddings: EmbeddingsConfig,
    pub generation: GenerationConfig,
    pub index: IndexConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingsConfig {
    /// OpenAI-compatible embeddings endpoint (e.g. a hosted model or local TEI)
    pub api_url: String,
    /// Bearer token; "mock" selects the in-process embedder
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
    /// Maximum inputs per upstream request
    pub batch_size: usize,
    /// Concurrent in-flight batch requests during document embedding
    pub max_concurrent_batches: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Text-generation-inference style endpoint
    pub api_url: String,
    /// Bearer token; "mock" selects the in-process generator
    pub api_key: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Vector index base URL; "memory" selects the in-process store
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub upsert_batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Total token window shared by prompt and completion
    pub max_total_tokens: usize,
    /// Reserved for the fixed prompt template
    pub base_prompt_tokens: usize,
    pub safety_buffer_tokens: usize,
    /// Divisor for the character-based token estimate
    pub chars_per_token: usize,
}

impl AppConfig {
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.rust_log", "info,corpusqa=debug")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.max_concurrent_requests", 100)?
            .set_default("embeddings.api_url", "http://localhost:8080/v1/embeddings")?
            .set_default("embeddings.api_key", "mock")?
            .set_default("embeddings.model", "text-embedding-ada-002")?
            .set_default("embeddings.dimension", 768)?
            .set_default("embeddings.timeout_secs", 30)?
            .set_default("embeddings.batch_size", 100)?
            .set_default("embeddings.max_concurrent_batches", 4)?
            .set_default("generation.api_url", "http://localhost:8081/generate")?
            .set_default("generation.api_key", "mock")?
            .set_default("generation.timeout_secs", 60)?
            .set_default("generation.temperature", 0.7)?
            .set_default("generation.top_p", 0.9)?
            .set_default("generation.repetition_penalty", 1.1)?
            .set_default("index.api_url", "memory")?
            .set_default("index.api_key", "")?
            .set_default("index.timeout_secs", 30)?
            .set_default("index.upsert_batch_size", 100)?
            .set_default("pipeline.chunk_size", 1000)?
            .set_default("pipeline.chunk_overlap", 200)?
            .set_default("pipeline.max_total_tokens", 2048)?
            .set_default("pipeline.base_prompt_tokens", 150)?
            .set_default("pipeline.safety_buffer_tokens", 50)?
            .set_default("pipeline.chars_per_token", 4)?
            // Environment overrides, e.g. APP__SERVER__PORT=8080
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
