//! Component catalog: embedded DSL fragments searchable by text similarity.

pub mod embedding;
pub mod seed;
pub mod storage;
pub mod store;

pub use embedding::{cosine_similarity, Embedder, EmbeddingError, HashingEmbedder, DEFAULT_DIMENSION};
pub use seed::{load_predefined, seed_from_schema, seed_predefined, SeedReport};
pub use storage::{CatalogEntry, CatalogStorage, JsonDirStorage};
pub use store::{ComponentCatalog, ScoredComponent};
