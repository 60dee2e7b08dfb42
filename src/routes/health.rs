//! Health and service information endpoints

use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub rag_pipeline: &'static str,
    pub timestamp: String,
}

/// Liveness check. The pipeline is constructed before the listener binds,
/// so a serving process implies an initialized pipeline.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "corpusqa is running",
        rag_pipeline: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Root endpoint with service information.
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "corpusqa document question answering API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health - Health check",
            "ingest": "POST /ingest - Upload a PDF document",
            "query": "POST /query - Ask a question (GET /query for the simple form)",
            "delete": "DELETE /documents/{document_name} - Delete a document",
            "stats": "GET /stats - Index statistics",
            "metrics": "GET /metrics - Prometheus metrics",
        },
    }))
}
