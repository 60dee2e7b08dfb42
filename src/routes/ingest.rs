use axum::extract::{Multipart, State};
use axum::Json;
use tracing::instrument;

use crate::errors::AppError;
use crate::services::pipeline::IngestReport;
use crate::services::AppState;

/// `POST /ingest` - multipart upload of a PDF document.
///
/// Expects a `file` part; an optional `document_name` part overrides the
/// name otherwise derived from the filename. Malformed uploads are rejected
/// here with 400; everything past this point is the orchestrator's
/// structured report.
#[instrument(skip(state, multipart))]
pub async fn ingest_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut name_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart payload: {e}")))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read uploaded file: {e}")))?;
                file_bytes = Some(data.to_vec());
            }
            Some("document_name") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read document name: {e}")))?;
                if !value.trim().is_empty() {
                    name_override = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::Validation("No file provided".into()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Empty file uploaded".into()));
    }

    let file_name = file_name.unwrap_or_default();
    if !file_name.to_lowercase().ends_with(".pdf") {
        return Err(AppError::Validation("Only PDF files are supported".into()));
    }

    let document_name =
        name_override.unwrap_or_else(|| file_name[..file_name.len() - 4].to_string());

    tracing::info!(document = %document_name, bytes = bytes.len(), "processing upload");
    let report = state.pipeline.ingest_document(&bytes, &document_name).await;

    Ok(Json(report))
}
