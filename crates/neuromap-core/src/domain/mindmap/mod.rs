//! Neural mind maps
//!
//! A mind map is a concept graph whose nodes carry embeddings, grouped into
//! similarity clusters and ranked into structural layers. This module holds
//! the data model and the pure algorithms over it:
//!
//! - [`MapStructureBuilder`] turns a raw graph plus embeddings into a map
//! - [`EvolutionEngine`] grows a map under a creativity factor
//! - [`MergeEngine`] folds several per-context maps into one
//!
//! Nothing here touches storage or the network; orchestration lives in
//! [`crate::engine`].

pub mod builder;
pub mod collaborators;
pub mod event;
pub mod evolution;
pub mod merge;
pub mod model;
pub mod similarity;

pub use builder::{BuildReport, BuildSettings, ConceptSeed, MapStructureBuilder};
pub use collaborators::{
    FetchOptions, GraphStore, Insight, InsightGenerator, InsightType, VisualizationAdapter,
};
pub use event::MindMapEvent;
pub use evolution::{
    EmergentPattern, EvolutionEngine, EvolutionOutcome, EvolutionSettings, EvolveOptions,
    PatternKind, detect_emergent_patterns, novelty_score, planned_growth,
};
pub use merge::{MergeEngine, MergeOptions, MergeSource, distinct_sources};
pub use model::{
    CognitiveMetrics, Cluster, ConceptNode, Connection, EvolutionMetrics, Layer, MapKey,
    NeuralMapStructure, RawEdge, RawGraph, RawNode,
};
pub use similarity::{Similarity, cosine_similarity};
