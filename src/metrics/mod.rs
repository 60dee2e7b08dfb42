//! Prometheus metrics endpoint

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and return the `/metrics` route.
pub fn setup_metrics() -> anyhow::Result<Router> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    let render = move || {
        let handle = handle.clone();
        async move { handle.render() }
    };

    Ok(Router::new().route("/metrics", get(render)))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "corpusqa_documents_ingested_total",
        "Documents ingested successfully"
    );
    metrics::describe_counter!("corpusqa_chunks_ingested_total", "Chunks embedded and stored");
    metrics::describe_counter!("corpusqa_ingest_failures_total", "Failed ingestion attempts");
    metrics::describe_counter!("corpusqa_queries_total", "Queries received");
    metrics::describe_counter!(
        "corpusqa_query_failures_total",
        "Queries that collapsed to the fallback result"
    );
    metrics::describe_histogram!(
        "corpusqa_ingest_duration_seconds",
        "Document ingestion latency in seconds"
    );
    metrics::describe_histogram!(
        "corpusqa_embedding_duration_seconds",
        "Chunk embedding latency in seconds"
    );
    metrics::describe_histogram!(
        "corpusqa_query_duration_seconds",
        "End-to-end query latency in seconds"
    );
}
