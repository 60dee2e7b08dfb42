//! Vector index gateway
//!
//! The nearest-neighbor store is an external collaborator; this module only
//! fixes its boundary: upsert embedded chunks, search with an optional
//! document filter, delete every record of a document, report stats.
//! `HttpVectorIndex` speaks a Pinecone-style REST protocol;
//! `MemoryVectorIndex` is an in-process cosine store for tests and keyless
//! local runs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::IndexConfig;
use crate::embeddings::EmbeddingVector;
use crate::errors::PipelineError;

/// Metadata attached to every indexed record. Known fields are explicit;
/// whatever else a backend returns rides along in `extra`.
/// `document_name` is always present; deletion filters on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    pub document_name: String,
    pub chunk_index: usize,
    pub chunk_id: String,
    pub chunk_hash: String,
    pub total_chunks: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record owned by the index: created on ingest, deleted with its document.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: EmbeddingVector,
    pub text: String,
    pub metadata: SourceMetadata,
}

/// A retrieval hit. Exists only within one query's lifetime.
#[derive(Debug, Clone)]
pub struct RetrievedMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: SourceMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), PipelineError>;

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        document_filter: Option<&str>,
    ) -> Result<Vec<RetrievedMatch>, PipelineError>;

    /// Remove every record whose `document_name` matches exactly
    /// (case-sensitive).
    async fn delete_by_document(&self, document_name: &str) -> Result<(), PipelineError>;

    /// Backend statistics, opaque to the pipeline.
    async fn stats(&self) -> Result<Value, PipelineError>;
}

/// Client for a Pinecone-style vector index service.
pub struct HttpVectorIndex {
    client: reqwest::Client,
    config: IndexConfig,
}

#[derive(Deserialize)]
struct WireQueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl HttpVectorIndex {
    pub fn new(config: IndexConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, PipelineError> {
        let url = format!("{}/{path}", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("index", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                service: "index",
                message: format!("API error {status}: {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("index", e))
    }
}

fn match_from_wire(mut wire: WireMatch) -> RetrievedMatch {
    let text = wire
        .metadata
        .remove("text")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let metadata =
        serde_json::from_value(Value::Object(wire.metadata)).unwrap_or_default();

    RetrievedMatch {
        id: wire.id,
        score: wire.score,
        text,
        metadata,
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), PipelineError> {
        let batch_size = self.config.upsert_batch_size.max(1);

        for (batch_no, batch) in records.chunks(batch_size).enumerate() {
            let mut vectors = Vec::with_capacity(batch.len());
            for record in batch {
                let mut metadata = serde_json::to_value(&record.metadata).map_err(|e| {
                    PipelineError::Internal(format!("metadata serialization failed: {e}"))
                })?;
                if let Some(fields) = metadata.as_object_mut() {
                    // The raw text lives in metadata, the way the backend
                    // stores it alongside the vector.
                    fields.insert("text".into(), Value::String(record.text.clone()));
                }
                vectors.push(json!({
                    "id": record.id,
                    "values": record.vector,
                    "metadata": metadata,
                }));
            }

            self.post("vectors/upsert", &json!({ "vectors": vectors }))
                .await?;
            debug!(batch = batch_no + 1, records = batch.len(), "upserted batch");
        }

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        document_filter: Option<&str>,
    ) -> Result<Vec<RetrievedMatch>, PipelineError> {
        let mut payload = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(name) = document_filter {
            payload["filter"] = json!({ "document_name": { "$eq": name } });
        }

        let body = self.post("query", &payload).await?;
        let parsed: WireQueryResponse = serde_json::from_value(body)
            .map_err(|e| PipelineError::upstream("index", e))?;

        Ok(parsed.matches.into_iter().map(match_from_wire).collect())
    }

    async fn delete_by_document(&self, document_name: &str) -> Result<(), PipelineError> {
        let payload = json!({
            "filter": { "document_name": { "$eq": document_name } }
        });
        self.post("vectors/delete", &payload).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<Value, PipelineError> {
        self.post("describe_index_stats", &json!({})).await
    }
}

/// In-process cosine-similarity store. Reads run concurrently; writes are
/// serialized behind the lock.
#[derive(Default)]
pub struct MemoryVectorIndex {
    records: RwLock<Vec<IndexedRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), PipelineError> {
        let mut store = self.records.write().await;
        for record in records {
            match store.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => store.push(record),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        document_filter: Option<&str>,
    ) -> Result<Vec<RetrievedMatch>, PipelineError> {
        let store = self.records.read().await;

        let mut matches: Vec<RetrievedMatch> = store
            .iter()
            .filter(|r| match document_filter {
                Some(name) => r.metadata.document_name == name,
                None => true,
            })
            .map(|r| RetrievedMatch {
                id: r.id.clone(),
                // Cosine lands in [-1, 1]; map it into the [0, 1] score space
                // hosted indexes report.
                score: (cosine_similarity(vector, &r.vector) + 1.0) / 2.0,
                text: r.text.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_document(&self, document_name: &str) -> Result<(), PipelineError> {
        let mut store = self.records.write().await;
        store.retain(|r| r.metadata.document_name != document_name);
        Ok(())
    }

    async fn stats(&self) -> Result<Value, PipelineError> {
        let store = self.records.read().await;
        let documents: HashSet<&str> = store
            .iter()
            .map(|r| r.metadata.document_name.as_str())
            .collect();
        Ok(json!({
            "total_records": store.len(),
            "total_documents": documents.len(),
            "dimension": store.first().map(|r| r.vector.len()).unwrap_or(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, document_name: &str, vector: EmbeddingVector) -> IndexedRecord {
        IndexedRecord {
            id: id.to_string(),
            vector,
            text: format!("text of {id}"),
            metadata: SourceMetadata {
                document_name: document_name.to_string(),
                chunk_id: id.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "doc1", vec![1.0, 0.0]),
                record("b", "doc1", vec![0.0, 1.0]),
                record("c", "doc1", vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let matches = index.search(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[1].id, "c");
        assert_eq!(matches[2].id, "b");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let index = MemoryVectorIndex::new();
        let records = (0..30)
            .map(|i| record(&format!("r{i}"), "doc1", vec![1.0, i as f32 / 30.0]))
            .collect();
        index.upsert(records).await.unwrap();

        let matches = index.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(matches.len(), 5);
    }

    #[tokio::test]
    async fn document_filter_is_exact_and_case_sensitive() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "doc1", vec![1.0, 0.0]),
                record("b", "Doc1", vec![1.0, 0.0]),
                record("c", "doc2", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = index.search(&[1.0, 0.0], 10, Some("doc1")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[tokio::test]
    async fn delete_removes_every_record_of_the_document() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "doc1", vec![1.0, 0.0]),
                record("b", "doc1", vec![0.5, 0.5]),
                record("c", "doc2", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        index.delete_by_document("doc1").await.unwrap();

        let matches = index.search(&[1.0, 0.0], 10, Some("doc1")).await.unwrap();
        assert!(matches.is_empty());
        let remaining = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.document_name, "doc2");
    }

    #[tokio::test]
    async fn upsert_replaces_records_by_id() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![record("a", "doc1", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![record("a", "doc1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats["total_records"], 1);
    }

    #[tokio::test]
    async fn scores_stay_in_unit_interval() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "doc1", vec![1.0, 0.0]),
                record("b", "doc1", vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();

        for m in index.search(&[1.0, 0.0], 10, None).await.unwrap() {
            assert!((0.0..=1.0).contains(&m.score));
        }
    }

    #[test]
    fn metadata_round_trips_with_extra_fields() {
        let mut extra = Map::new();
        extra.insert("page".into(), json!(3));

        let metadata = SourceMetadata {
            document_name: "doc1".into(),
            chunk_index: 2,
            chunk_id: "doc1_chunk_2".into(),
            chunk_hash: "abc".into(),
            total_chunks: 5,
            extra,
        };

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["document_name"], "doc1");
        assert_eq!(value["page"], 3);

        let back: SourceMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back.chunk_index, 2);
        assert_eq!(back.extra["page"], 3);
    }

    #[test]
    fn wire_match_tolerates_partial_metadata() {
        let wire = WireMatch {
            id: "x".into(),
            score: 0.4,
            metadata: serde_json::from_value(json!({
                "text": "the passage",
                "document_name": "doc1",
            }))
            .unwrap(),
        };

        let m = match_from_wire(wire);
        assert_eq!(m.text, "the passage");
        assert_eq!(m.metadata.document_name, "doc1");
        assert_eq!(m.metadata.chunk_index, 0);
    }
}
