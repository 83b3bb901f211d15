//! Traits for the services a mind map engine consumes
//!
//! The engine owns none of these: graph storage, insight generation and
//! visualization are supplied by the host application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::evolution::EmergentPattern;
use super::model::{NeuralMapStructure, RawGraph};

/// Options passed through to the graph store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Cap on the number of nodes returned
    pub max_nodes: Option<usize>,
    /// Whether to include nodes added by knowledge expansion
    pub include_expanded: bool,
}

/// Source of raw concept graphs
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch the concept graph for a user and context.
    ///
    /// An unknown context yields an empty graph, not an error.
    async fn fetch_graph(
        &self,
        user_id: &str,
        context: &str,
        options: &FetchOptions,
    ) -> Result<RawGraph>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Structure,
    Cluster,
    Hub,
    Emergence,
    Gap,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Cluster => "cluster",
            Self::Hub => "hub",
            Self::Emergence => "emergence",
            Self::Gap => "gap",
        }
    }
}

/// An observation about a finished map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub description: String,
    pub insight_type: InsightType,
    pub confidence: f32,
}

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate_insights(
        &self,
        structure: &NeuralMapStructure,
        patterns: &[EmergentPattern],
    ) -> Result<Vec<Insight>>;
}

/// Renders a map into a front-end payload
#[async_trait]
pub trait VisualizationAdapter: Send + Sync {
    async fn render(&self, structure: &NeuralMapStructure) -> Result<serde_json::Value>;
}
