//! Per-context network models
//!
//! A [`NetworkModel`] captures the structural parameters used consistently
//! by generate, evolve and merge calls for one `(user, context)` pair.
//! Models are built lazily on first use and cached until invalidated.
//!
//! Building depends only on configuration, never on graph content, so two
//! builds with the same parameters produce value-equal models (apart from
//! centroids learned later from committed maps).

mod manager;

pub use manager::NetworkModelManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Cached structural parameters for one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub user_id: String,
    pub context: String,
    pub embedding_dimension: usize,
    pub network_depth: usize,
    pub min_similarity_threshold: f32,
    /// Clusters of the last committed map for this context. The next
    /// structure built from this model reuses their ids for matching clusters.
    pub centroids: Vec<ClusterCentroid>,
    pub built_at: DateTime<Utc>,
}

/// A cluster id with the centroid it had when last committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub cluster_id: String,
    pub centroid: Vec<f32>,
}

impl NetworkModel {
    pub fn params(&self) -> NetworkParams {
        NetworkParams {
            embedding_dimension: self.embedding_dimension,
            network_depth: self.network_depth,
            min_similarity_threshold: self.min_similarity_threshold,
        }
    }
}

/// The configuration a model is built from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub embedding_dimension: usize,
    pub network_depth: usize,
    pub min_similarity_threshold: f32,
}

impl NetworkParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            embedding_dimension: config.embedding_dimension,
            network_depth: config.network_depth,
            min_similarity_threshold: config.min_similarity_threshold,
        }
    }

    pub fn with_overrides(mut self, overrides: &NetworkOverrides) -> Self {
        if let Some(dimension) = overrides.embedding_dimension {
            self.embedding_dimension = dimension;
        }
        if let Some(depth) = overrides.network_depth {
            self.network_depth = depth;
        }
        if let Some(threshold) = overrides.min_similarity_threshold {
            self.min_similarity_threshold = threshold;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            return Err(Error::validation("embedding dimension must be greater than zero"));
        }
        if self.network_depth == 0 {
            return Err(Error::validation("network depth must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.min_similarity_threshold) {
            return Err(Error::validation(format!(
                "similarity threshold {} must be between 0.0 and 1.0",
                self.min_similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Per-call overrides of the engine's default network parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkOverrides {
    pub embedding_dimension: Option<usize>,
    pub network_depth: Option<usize>,
    pub min_similarity_threshold: Option<f32>,
}

impl NetworkOverrides {
    pub fn is_empty(&self) -> bool {
        self.embedding_dimension.is_none()
            && self.network_depth.is_none()
            && self.min_similarity_threshold.is_none()
    }
}
