use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::index::VectorIndex;

pub mod pipeline;
pub mod validate;

pub use pipeline::Pipeline;

/// Shared handler state. The orchestrator is constructed once at startup
/// and injected by reference into every handler; there is no global
/// instance and no hidden reinitialization.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn VectorIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(embedder, generator, index, config)),
        }
    }
}
