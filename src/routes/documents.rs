use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::instrument;

use crate::errors::{AppError, PipelineError};
use crate::services::pipeline::DeleteReport;
use crate::services::AppState;

/// `DELETE /documents/{document_name}` - remove every indexed record whose
/// document name matches exactly (case-sensitive).
#[instrument(skip(state))]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_name): Path<String>,
) -> Result<Json<DeleteReport>, AppError> {
    let name = document_name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Document name cannot be empty".into()));
    }

    let report = state.pipeline.delete_document(name).await;
    if !report.success {
        return Err(AppError::Unavailable(report.message));
    }

    Ok(Json(report))
}

/// `GET /stats` - backend index statistics, opaque to this service.
#[instrument(skip(state))]
pub async fn index_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let stats = state.pipeline.stats().await.map_err(|e| match e {
        PipelineError::Upstream { .. } => AppError::Unavailable(e.to_string()),
        other => AppError::Internal(anyhow::anyhow!(other)),
    })?;

    Ok(Json(json!({
        "stats": stats,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
