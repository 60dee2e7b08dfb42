mod chunker;
mod config;
mod context;
mod embeddings;
mod errors;
mod extract;
mod generation;
mod index;
mod metrics;
mod prompt;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::embeddings::{Embedder, HttpEmbedder, MockEmbedder};
use crate::generation::{Generator, HttpGenerator, MockGenerator};
use crate::index::{HttpVectorIndex, MemoryVectorIndex, VectorIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    dotenvy::dotenv().ok();
    let config = config::AppConfig::build()?;

    // 2. Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting corpusqa");

    // 3. Metrics recorder and /metrics route
    let metrics_router = metrics::setup_metrics()?;

    // 4. External gateways. An api_key of "mock" (or the "memory" index URL)
    //    selects the in-process stand-ins, which keeps local runs keyless.
    let embedder: Arc<dyn Embedder> = if config.embeddings.api_key == "mock" {
        Arc::new(MockEmbedder::new(config.embeddings.dimension))
    } else {
        Arc::new(HttpEmbedder::new(config.embeddings.clone())?)
    };

    let generator: Arc<dyn Generator> = if config.generation.api_key == "mock" {
        Arc::new(MockGenerator::default())
    } else {
        Arc::new(HttpGenerator::new(config.generation.clone())?)
    };

    let vector_index: Arc<dyn VectorIndex> = if config.index.api_url == "memory" {
        Arc::new(MemoryVectorIndex::new())
    } else {
        Arc::new(HttpVectorIndex::new(config.index.clone())?)
    };

    // 5. App state. The orchestrator is built once here and injected into
    //    handlers; its lifecycle is the process lifetime.
    let state = services::AppState::new(embedder, generator, vector_index, config.pipeline.clone());

    // 6. Router
    let app = routes::create_router(state, &config.server, metrics_router);

    // 7. Serve
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, starting shutdown..."),
    }
}
