use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

use crate::errors::AppError;
use crate::services::validate::QueryResult;
use crate::services::AppState;

fn default_top_k() -> usize {
    5
}

fn default_max_length() -> usize {
    512
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "question must not be empty"))]
    pub question: String,

    /// Number of sources to retrieve; out-of-range values are clamped
    /// internally to [1, 20].
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Exact-match document name filter
    #[serde(default)]
    pub document_filter: Option<String>,

    /// Maximum response length in tokens
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

/// `POST /query` - answer a question against the ingested corpus.
#[instrument(skip(state, request))]
pub async fn query_documents(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if request.question.trim().is_empty() {
        return Err(AppError::Validation("Question cannot be empty".into()));
    }

    tracing::info!(
        question = %request.question.chars().take(100).collect::<String>(),
        top_k = request.top_k,
        filter = ?request.document_filter,
        "processing query"
    );

    let result = state
        .pipeline
        .query(
            &request.question,
            request.top_k,
            request.document_filter.as_deref(),
            request.max_length,
        )
        .await;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    q: String,
    top_k: Option<usize>,
    document_filter: Option<String>,
    max_length: Option<usize>,
}

/// `GET /query` - query-string variant for quick manual use.
#[instrument(skip(state, params))]
pub async fn simple_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>, AppError> {
    let request = QueryRequest {
        question: params.q,
        top_k: params.top_k.unwrap_or_else(default_top_k),
        document_filter: params.document_filter,
        max_length: params.max_length.unwrap_or_else(default_max_length),
    };
    query_documents(State(state), Json(request)).await
}
