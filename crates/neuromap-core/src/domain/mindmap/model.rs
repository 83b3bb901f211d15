//! Mind map data model
//!
//! Nodes, connections, clusters and layers of a neural mind map, plus the
//! raw graph shape the builder consumes. Structures are immutable once
//! produced: evolution and merge create new records instead of editing
//! existing ones.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key of a stored map: one map per user and context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapKey {
    pub user_id: String,
    pub context: String,
}

impl MapKey {
    pub fn new(user_id: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.context)
    }
}

/// A concept in the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Unique within one map
    pub id: String,
    pub label: String,
    pub embedding: Vec<f32>,
    pub weight: f32,
    /// Id of the cluster the node belongs to
    pub community_id: String,
    pub betweenness: f32,
    pub relevance: f32,
    pub layer_index: usize,
}

/// An undirected, weighted link between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub weight: f32,
    pub statement: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
            statement: None,
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Order-independent identity of the connection
    pub fn endpoint_key(&self) -> (String, String) {
        if self.source <= self.target {
            (self.source.clone(), self.target.clone())
        } else {
            (self.target.clone(), self.source.clone())
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    /// Member ids in insertion order
    pub node_ids: Vec<String>,
    /// Mean intra-cluster similarity, 0-1
    pub coherence: f32,
    pub centroid: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub depth: usize,
    pub node_ids: Vec<String>,
}

/// Scalar summary of a map's shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CognitiveMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub cluster_count: usize,
    pub layer_count: usize,
    pub average_cluster_coherence: f32,
    pub knowledge_density: f32,
    pub cognitive_complexity_score: f32,
}

/// Weight of mean cluster coherence in the complexity score
pub const COMPLEXITY_COHERENCE_WEIGHT: f32 = 0.4;
/// Weight of cluster count (saturating at 10 clusters)
pub const COMPLEXITY_CLUSTER_WEIGHT: f32 = 0.3;
/// Weight of layer count (saturating at 5 layers)
pub const COMPLEXITY_LAYER_WEIGHT: f32 = 0.3;

impl CognitiveMetrics {
    pub fn compute(
        node_count: usize,
        edge_count: usize,
        clusters: &[Cluster],
        layer_count: usize,
    ) -> Self {
        let cluster_count = clusters.len();
        let average_cluster_coherence = if clusters.is_empty() {
            0.0
        } else {
            clusters.iter().map(|c| c.coherence).sum::<f32>() / cluster_count as f32
        };
        let knowledge_density = edge_count as f32 / node_count.max(1) as f32;
        let cognitive_complexity_score = COMPLEXITY_COHERENCE_WEIGHT * average_cluster_coherence
            + COMPLEXITY_CLUSTER_WEIGHT * (cluster_count as f32 / 10.0).min(1.0)
            + COMPLEXITY_LAYER_WEIGHT * (layer_count as f32 / 5.0).min(1.0);

        Self {
            node_count,
            edge_count,
            cluster_count,
            layer_count,
            average_cluster_coherence,
            knowledge_density,
            cognitive_complexity_score,
        }
    }
}

/// How much an evolution step changed the map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionMetrics {
    pub original_size: usize,
    pub new_size: usize,
    /// Fraction of genuinely new structure, 0-1
    pub novelty: f32,
    pub added_nodes: usize,
    pub pruned_nodes: usize,
    pub added_connections: usize,
    pub mutated_connections: usize,
    pub creativity_factor: f32,
}

/// A complete neural mind map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralMapStructure {
    pub id: String,
    pub context: String,
    pub embedding_dimension: usize,
    pub network_depth: usize,
    pub nodes: Vec<ConceptNode>,
    pub connections: Vec<Connection>,
    pub layers: Vec<Layer>,
    pub clusters: Vec<Cluster>,
    pub cognitive_metrics: CognitiveMetrics,
    pub evolution_metrics: Option<EvolutionMetrics>,
    pub created_at: DateTime<Utc>,
}

impl NeuralMapStructure {
    pub fn node(&self, id: &str) -> Option<&ConceptNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Check the structural invariants every stored map must satisfy:
    /// one embedding dimension, resolvable connection endpoints, clusters
    /// and layers partitioning the node set, and in-range layer depths.
    pub fn validate_invariants(&self) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(Error::computation(format!(
                    "duplicate node id '{}' in map {}",
                    node.id, self.id
                )));
            }
            if node.embedding.len() != self.embedding_dimension {
                return Err(Error::computation(format!(
                    "node '{}' has embedding dimension {}, map expects {}",
                    node.id,
                    node.embedding.len(),
                    self.embedding_dimension
                )));
            }
            if node.layer_index >= self.network_depth {
                return Err(Error::computation(format!(
                    "node '{}' has layer index {} outside network depth {}",
                    node.id, node.layer_index, self.network_depth
                )));
            }
        }

        for conn in &self.connections {
            if !ids.contains(conn.source.as_str()) || !ids.contains(conn.target.as_str()) {
                return Err(Error::computation(format!(
                    "connection {} -> {} references a missing node",
                    conn.source, conn.target
                )));
            }
            if conn.source == conn.target {
                return Err(Error::computation(format!(
                    "self-loop on node '{}'",
                    conn.source
                )));
            }
            if !(conn.weight > 0.0) {
                return Err(Error::computation(format!(
                    "connection {} -> {} has non-positive weight",
                    conn.source, conn.target
                )));
            }
        }

        check_partition(
            "cluster",
            &ids,
            self.clusters.iter().map(|c| c.node_ids.as_slice()),
        )?;
        check_partition(
            "layer",
            &ids,
            self.layers.iter().map(|l| l.node_ids.as_slice()),
        )?;

        for layer in &self.layers {
            if layer.depth >= self.network_depth {
                return Err(Error::computation(format!(
                    "layer depth {} outside network depth {}",
                    layer.depth, self.network_depth
                )));
            }
        }

        Ok(())
    }
}

fn check_partition<'a>(
    what: &str,
    ids: &HashSet<&str>,
    groups: impl Iterator<Item = &'a [String]>,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for group in groups {
        for id in group {
            if !ids.contains(id.as_str()) {
                return Err(Error::computation(format!(
                    "{} references unknown node '{}'",
                    what, id
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(Error::computation(format!(
                    "node '{}' belongs to more than one {}",
                    id, what
                )));
            }
        }
    }
    if seen.len() != ids.len() {
        return Err(Error::computation(format!(
            "{} membership covers {} of {} nodes",
            what,
            seen.len(),
            ids.len()
        )));
    }
    Ok(())
}

/// A node as delivered by the graph store, before embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl RawNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub statement: Option<String>,
}

impl RawEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: None,
            statement: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }
}

/// A concept graph as fetched from storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

impl RawGraph {
    pub fn new(nodes: Vec<RawNode>, edges: Vec<RawEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, layer: usize) -> ConceptNode {
        ConceptNode {
            id: id.into(),
            label: id.into(),
            embedding: vec![1.0, 0.0],
            weight: 1.0,
            community_id: "cluster-0".into(),
            betweenness: 0.0,
            relevance: 1.0,
            layer_index: layer,
        }
    }

    fn structure(nodes: Vec<ConceptNode>, connections: Vec<Connection>) -> NeuralMapStructure {
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        NeuralMapStructure {
            id: "map".into(),
            context: "ctx".into(),
            embedding_dimension: 2,
            network_depth: 2,
            clusters: vec![Cluster {
                id: "cluster-0".into(),
                node_ids: ids.clone(),
                coherence: 1.0,
                centroid: vec![1.0, 0.0],
            }],
            layers: vec![Layer {
                depth: 0,
                node_ids: ids,
            }],
            cognitive_metrics: CognitiveMetrics::default(),
            evolution_metrics: None,
            created_at: Utc::now(),
            nodes,
            connections,
        }
    }

    #[test]
    fn test_complexity_score_formula() {
        let clusters = vec![
            Cluster {
                id: "a".into(),
                node_ids: vec![],
                coherence: 1.0,
                centroid: vec![],
            },
            Cluster {
                id: "b".into(),
                node_ids: vec![],
                coherence: 0.5,
                centroid: vec![],
            },
        ];
        let metrics = CognitiveMetrics::compute(4, 6, &clusters, 5);

        assert_eq!(metrics.cluster_count, 2);
        assert!((metrics.average_cluster_coherence - 0.75).abs() < 1e-6);
        assert!((metrics.knowledge_density - 1.5).abs() < 1e-6);
        let expected = 0.4 * 0.75 + 0.3 * 0.2 + 0.3 * 1.0;
        assert!((metrics.cognitive_complexity_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_empty_metrics_do_not_divide_by_zero() {
        let metrics = CognitiveMetrics::compute(0, 0, &[], 0);
        assert_eq!(metrics.knowledge_density, 0.0);
        assert_eq!(metrics.cognitive_complexity_score, 0.0);
    }

    #[test]
    fn test_connection_endpoint_key_is_order_independent() {
        let a = Connection::new("x", "y", 1.0);
        let b = Connection::new("y", "x", 1.0);
        assert_eq!(a.endpoint_key(), b.endpoint_key());
    }

    #[test]
    fn test_validate_accepts_consistent_structure() {
        let s = structure(
            vec![node("a", 0), node("b", 1)],
            vec![Connection::new("a", "b", 0.5)],
        );
        assert!(s.validate_invariants().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_connection() {
        let s = structure(vec![node("a", 0)], vec![Connection::new("a", "ghost", 0.5)]);
        let err = s.validate_invariants().unwrap_err();
        assert!(matches!(err, Error::Computation(_)));
    }

    #[test]
    fn test_validate_rejects_layer_out_of_range() {
        let s = structure(vec![node("a", 2)], vec![]);
        assert!(s.validate_invariants().is_err());
    }

    #[test]
    fn test_validate_rejects_partial_cluster_cover() {
        let mut s = structure(vec![node("a", 0), node("b", 0)], vec![]);
        s.clusters[0].node_ids.pop();
        assert!(s.validate_invariants().is_err());
    }

    #[test]
    fn test_raw_graph_deserializes_without_optional_fields() {
        let graph: RawGraph = serde_json::from_str(
            r#"{"nodes":[{"id":"a","label":"Alpha"}],"edges":[{"source":"a","target":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(graph.nodes[0].weight, None);
        assert_eq!(graph.edges[0].statement, None);
    }

    #[test]
    fn test_map_key_display() {
        assert_eq!(MapKey::new("user123", "ctx").to_string(), "user123/ctx");
    }
}
