pub mod documents;
pub mod health;
pub mod ingest;
pub mod query;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::services::AppState;

/// Upload cap for /ingest; axum's default 2 MB is too small for PDFs.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn create_router(state: AppState, server: &ServerConfig, metrics_router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route(
            "/ingest",
            post(ingest::ingest_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/query", post(query::query_documents).get(query::simple_query))
        .route("/documents/{document_name}", delete(documents::delete_document))
        .route("/stats", get(documents::index_stats))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                // Trace first so every request is logged, then backpressure.
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    server.request_timeout_secs,
                )))
                .layer(ConcurrencyLimitLayer::new(server.max_concurrent_requests))
                .layer(cors),
        )
}
