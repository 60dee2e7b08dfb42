//! Pipeline orchestrator
//!
//! Sequences the ingest flow (extract, chunk, embed, store) and the query
//! flow (embed, retrieve, assemble, generate, validate) across the gateways
//! and the index. Every stage failure is caught here and converted into a
//! structured fallback result; no raw service error crosses this boundary.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::config::PipelineConfig;
use crate::context::{AssemblerConfig, CharTokenEstimator, ContextAssembler};
use crate::embeddings::Embedder;
use crate::errors::PipelineError;
use crate::extract;
use crate::generation::Generator;
use crate::index::{IndexedRecord, RetrievedMatch, SourceMetadata, VectorIndex};
use crate::prompt;

use super::validate::{self, QueryResult, RawQueryOutcome};

/// Answer returned when retrieval finds nothing relevant. A successful
/// empty outcome, not an error.
const NO_SOURCES_ANSWER: &str = "I couldn't find relevant information in the knowledge base \
to answer your question. Please try rephrasing your question or check if the relevant \
documents have been uploaded.";

/// Hard ceiling on results requested from the index.
const MAX_TOP_K: usize = 20;

/// Conservative bounds on the completion length, below the API-level cap.
const MIN_ANSWER_TOKENS: usize = 50;
const MAX_ANSWER_TOKENS: usize = 400;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub message: String,
    pub chunks_processed: usize,
    pub document_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub success: bool,
    pub message: String,
}

pub struct Pipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Arc<dyn VectorIndex>,
    assembler: ContextAssembler,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn VectorIndex>,
        config: PipelineConfig,
    ) -> Self {
        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        });
        let assembler = ContextAssembler::new(
            AssemblerConfig {
                max_total_tokens: config.max_total_tokens,
                base_prompt_tokens: config.base_prompt_tokens,
                safety_buffer_tokens: config.safety_buffer_tokens,
            },
            Box::new(CharTokenEstimator {
                chars_per_token: config.chars_per_token,
            }),
        );

        Self {
            chunker,
            embedder,
            generator,
            index,
            assembler,
        }
    }

    /// Ingest a PDF document. Never fails: every stage failure collapses
    /// into a structured failure report.
    pub async fn ingest_document(&self, bytes: &[u8], document_name: &str) -> IngestReport {
        let document_name = document_name.trim();
        if bytes.is_empty() {
            return failure_report("Document content is empty", document_name);
        }
        if document_name.is_empty() {
            return failure_report("Document name is required", document_name);
        }

        let text = match extract::extract_text(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(document = document_name, error = %e, "extraction failed");
                return failure_report(&e.to_string(), document_name);
            }
        };

        self.ingest_extracted(&text, document_name).await
    }

    /// Ingest already-extracted text under a document name.
    pub async fn ingest_extracted(&self, text: &str, document_name: &str) -> IngestReport {
        let start = Instant::now();
        let document_name = document_name.trim();

        match self.run_ingest(text, document_name).await {
            Ok(chunks_processed) => {
                metrics::counter!("corpusqa_documents_ingested_total").increment(1);
                metrics::counter!("corpusqa_chunks_ingested_total")
                    .increment(chunks_processed as u64);
                metrics::histogram!("corpusqa_ingest_duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                info!(
                    document = document_name,
                    chunks = chunks_processed,
                    total_ms = start.elapsed().as_millis(),
                    "document ingested"
                );

                IngestReport {
                    success: true,
                    message: format!(
                        "Successfully processed and stored {chunks_processed} chunks"
                    ),
                    chunks_processed,
                    document_name: document_name.to_string(),
                }
            }
            Err(e) => {
                warn!(document = document_name, error = %e, "ingestion failed");
                metrics::counter!("corpusqa_ingest_failures_total").increment(1);
                failure_report(&e.to_string(), document_name)
            }
        }
    }

    async fn run_ingest(&self, text: &str, document_name: &str) -> Result<usize, PipelineError> {
        if document_name.is_empty() {
            return Err(PipelineError::Input("Document name is required".into()));
        }
        if text.trim().is_empty() {
            return Err(PipelineError::Data(
                "no text could be extracted from the document".into(),
            ));
        }

        // CHUNKED
        let chunks = self.chunker.chunk(text, document_name);
        if chunks.is_empty() {
            return Err(PipelineError::Data(
                "no text chunks could be produced from the document".into(),
            ));
        }
        debug!(document = document_name, chunks = chunks.len(), "text chunked");

        // EMBEDDED
        let embed_start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(PipelineError::Data(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        metrics::histogram!("corpusqa_embedding_duration_seconds")
            .record(embed_start.elapsed().as_secs_f64());

        // STORED
        let records: Vec<IndexedRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexedRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata: SourceMetadata {
                    chunk_id: format!("{}_chunk_{}", chunk.document_name, chunk.chunk_index),
                    document_name: chunk.document_name,
                    chunk_index: chunk.chunk_index,
                    chunk_hash: chunk.chunk_hash,
                    total_chunks: chunk.total_chunks,
                    extra: Default::default(),
                },
                text: chunk.text,
            })
            .collect();

        let stored = records.len();
        self.index.upsert(records).await?;
        Ok(stored)
    }

    /// Answer a question against the ingested corpus. Never fails: any
    /// stage failure collapses into the deterministic fallback result.
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        document_filter: Option<&str>,
        max_length: usize,
    ) -> QueryResult {
        let start = Instant::now();

        let question = question.trim();
        if question.is_empty() {
            return validate::fallback_result("Please provide a valid question.");
        }

        let top_k = top_k.clamp(1, MAX_TOP_K);
        let max_new_tokens = max_length.clamp(MIN_ANSWER_TOKENS, MAX_ANSWER_TOKENS);
        let document_filter = document_filter.map(str::trim).filter(|f| !f.is_empty());

        metrics::counter!("corpusqa_queries_total").increment(1);

        let result = match self
            .run_query(question, top_k, document_filter, max_new_tokens)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "query pipeline failed, returning fallback");
                metrics::counter!("corpusqa_query_failures_total").increment(1);
                validate::fallback_result(validate::FALLBACK_ANSWER)
            }
        };

        metrics::histogram!("corpusqa_query_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        info!(
            sources = result.num_sources,
            confidence = result.confidence,
            total_ms = start.elapsed().as_millis(),
            "query processed"
        );

        result
    }

    async fn run_query(
        &self,
        question: &str,
        top_k: usize,
        document_filter: Option<&str>,
        max_new_tokens: usize,
    ) -> Result<QueryResult, PipelineError> {
        // EMBEDDED
        let query_vector = self.embedder.embed_query(question).await?;

        // RETRIEVED
        let matches: Vec<RetrievedMatch> = self
            .index
            .search(&query_vector, top_k, document_filter)
            .await?;
        debug!(matches = matches.len(), top_k, "retrieval complete");

        if matches.is_empty() {
            return Ok(validate::fallback_result(NO_SOURCES_ANSWER));
        }

        // CONTEXT_BUILT
        let context = self.assembler.assemble(&matches, question, max_new_tokens);

        // GENERATED
        let prompt = prompt::build_prompt(question, &context);
        let answer = self.generator.generate(&prompt, max_new_tokens).await?;

        // VALIDATED
        let confidence = validate::confidence(&matches);
        Ok(validate::validate(RawQueryOutcome {
            answer,
            matches,
            confidence,
        }))
    }

    /// Remove every indexed record belonging to `document_name`.
    pub async fn delete_document(&self, document_name: &str) -> DeleteReport {
        match self.index.delete_by_document(document_name).await {
            Ok(()) => {
                info!(document = document_name, "document deleted");
                DeleteReport {
                    success: true,
                    message: format!("Successfully deleted document: {document_name}"),
                }
            }
            Err(e) => {
                warn!(document = document_name, error = %e, "delete failed");
                DeleteReport {
                    success: false,
                    message: format!("Failed to delete document {document_name}: {e}"),
                }
            }
        }
    }

    /// Backend index statistics, passed through opaquely.
    pub async fn stats(&self) -> Result<serde_json::Value, PipelineError> {
        self.index.stats().await
    }
}

fn failure_report(message: &str, document_name: &str) -> IngestReport {
    IngestReport {
        success: false,
        message: message.to_string(),
        chunks_processed: 0,
        document_name: document_name.to_string(),
    }
}
