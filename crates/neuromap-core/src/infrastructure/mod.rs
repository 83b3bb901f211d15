//! Infrastructure layer
//!
//! In-process implementations of the collaborator traits. They make the
//! engine and CLI usable without external services and back the test suite.

pub mod embedding;
pub mod graph;
pub mod insight;
pub mod visualization;

pub use embedding::HashEmbeddingProvider;
pub use graph::InMemoryGraphStore;
pub use insight::StructuralInsightGenerator;
pub use visualization::ForceGraphAdapter;
