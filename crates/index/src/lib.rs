mod embedding;
mod index;
mod log;

pub use embedding::{
    EmbeddingBackend, EmbeddingClient, HashEmbedder, HashEmbedderConfig, OllamaEmbeddingClient,
};
pub use index::{Hit, IndexEntry, IndexMeta, QueryFilters, RebuildStats, VectorIndex};
pub use log::{JsonlWriter, LogRecord};
