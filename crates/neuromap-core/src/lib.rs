//! Neuromap Core Library
//!
//! This crate provides the core functionality for Neuromap, including:
//! - Map synthesis from raw concept graphs and embeddings
//! - Similarity clustering and structural layering
//! - Creativity-driven evolution with emergent pattern detection
//! - Similarity-based merging of per-context maps
//! - Cached embeddings and per-context network models
//! - Knowledge expansion jobs with bounded, cancellable waits
//! - A per-key locked map store and the engine that ties it together

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod infrastructure;

pub use engine::{
    EvolveOptions, GenerateOptions, MergeOptions, MindMapOutcome, NeuralMindMapEngine,
    NeuralMindMapEngineBuilder,
};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::mindmap::{
        ConceptNode, Connection, MindMapEvent, NeuralMapStructure, RawEdge, RawGraph, RawNode,
    };
    pub use crate::engine::{
        EvolveOptions, GenerateOptions, MergeOptions, MindMapOutcome, NeuralMindMapEngine,
    };
    pub use crate::error::{Error, Result};
}

#[cfg(test)]
mod error_tests;
