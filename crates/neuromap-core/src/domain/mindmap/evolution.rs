//! Evolution engine
//!
//! Grows an existing map under a creativity factor in `[0, 1]`:
//!
//! - prunes isolated, low-relevance concepts
//! - mutates a creativity-scaled share of connection weights
//! - derives new concepts from the most relevant existing ones, with
//!   embeddings perturbed further from their parent as creativity rises
//! - links new concepts to similar nodes, accepting looser matches at
//!   higher creativity
//! - recomputes structure through the builder and detects emergent patterns
//!
//! All randomness comes from a ChaCha8 stream seeded by the baseline id, so
//! the same baseline and options always evolve the same way.

use std::collections::{HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::builder::{ConceptSeed, MIN_CONNECTION_WEIGHT, MapStructureBuilder};
use super::model::{ConceptNode, Connection, EvolutionMetrics, NeuralMapStructure};
use super::similarity::normalize;
use crate::config::EvolutionConfig;
use crate::domain::network::NetworkModel;
use crate::error::{Error, Result};

/// Prefix marking evolved map ids
pub const EVOLVED_PREFIX: &str = "evolved-";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSettings {
    pub max_growth_ratio: f32,
    pub prune_relevance_threshold: f32,
    pub max_links_per_new_concept: usize,
}

impl From<&EvolutionConfig> for EvolutionSettings {
    fn from(config: &EvolutionConfig) -> Self {
        Self {
            max_growth_ratio: config.max_growth_ratio,
            prune_relevance_threshold: config.prune_relevance_threshold,
            max_links_per_new_concept: config.max_links_per_new_concept,
        }
    }
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self::from(&EvolutionConfig::default())
    }
}

/// Per-call evolution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolveOptions {
    pub creativity_factor: f32,
    /// Exact number of new concepts; `None` uses [`planned_growth`]
    pub new_concepts: Option<usize>,
}

impl Default for EvolveOptions {
    fn default() -> Self {
        Self {
            creativity_factor: EvolutionConfig::default().creativity_factor,
            new_concepts: None,
        }
    }
}

impl EvolveOptions {
    pub fn with_creativity(creativity_factor: f32) -> Self {
        Self {
            creativity_factor,
            new_concepts: None,
        }
    }

    pub fn with_new_concepts(mut self, count: usize) -> Self {
        self.new_concepts = Some(count);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// A cluster made only of concepts the baseline did not have
    NovelCluster,
    /// A cluster joining members of two or more baseline clusters
    ClusterFusion,
    /// A new concept linked into two or more baseline clusters
    Bridge,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NovelCluster => "novel_cluster",
            Self::ClusterFusion => "cluster_fusion",
            Self::Bridge => "bridge",
        }
    }
}

/// Structure present after evolution but absent from the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergentPattern {
    pub kind: PatternKind,
    pub node_ids: Vec<String>,
    pub description: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub structure: NeuralMapStructure,
    pub patterns: Vec<EmergentPattern>,
    /// Pattern detection failed; the structure is still valid
    pub patterns_degraded: bool,
}

/// Number of new concepts for a baseline of `baseline_nodes` concepts:
/// `ceil(n * creativity * ratio)`, zero for an empty baseline or zero creativity
pub fn planned_growth(baseline_nodes: usize, creativity: f32, max_growth_ratio: f32) -> usize {
    if baseline_nodes == 0 || creativity <= 0.0 || max_growth_ratio <= 0.0 {
        return 0;
    }
    (baseline_nodes as f32 * creativity * max_growth_ratio).ceil() as usize
}

/// Fraction of the evolved map's nodes and connections that are new
pub fn novelty_score(
    added_nodes: usize,
    added_connections: usize,
    total_nodes: usize,
    total_connections: usize,
) -> f32 {
    let total = (total_nodes + total_connections).max(1);
    ((added_nodes + added_connections) as f32 / total as f32).clamp(0.0, 1.0)
}

fn rng_for(baseline_id: &str, creativity: f32) -> ChaCha8Rng {
    let digest = Sha256::digest(baseline_id.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed) ^ u64::from(creativity.to_bits()))
}

fn unique_child_id(parent: &str, taken: &HashSet<String>) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{}-evo-{}", parent, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionEngine {
    settings: EvolutionSettings,
    builder: MapStructureBuilder,
}

impl EvolutionEngine {
    pub fn new(settings: EvolutionSettings, builder: MapStructureBuilder) -> Self {
        Self { settings, builder }
    }

    pub fn evolve(
        &self,
        baseline: &NeuralMapStructure,
        model: &NetworkModel,
        options: &EvolveOptions,
    ) -> Result<EvolutionOutcome> {
        let creativity = options.creativity_factor;
        if !creativity.is_finite() || !(0.0..=1.0).contains(&creativity) {
            return Err(Error::validation(format!(
                "creativity factor {} must be between 0.0 and 1.0",
                creativity
            )));
        }
        if baseline.embedding_dimension != model.embedding_dimension {
            return Err(Error::validation(format!(
                "baseline embedding dimension {} does not match network model dimension {}",
                baseline.embedding_dimension, model.embedding_dimension
            )));
        }

        let mut rng = rng_for(&baseline.id, creativity);

        let pruned = self.select_pruned(baseline);
        let survivors: Vec<&ConceptNode> = baseline
            .nodes
            .iter()
            .filter(|n| !pruned.contains(n.id.as_str()))
            .collect();

        let mut mutated = 0;
        let mut connections: Vec<Connection> = Vec::with_capacity(baseline.connections.len());
        for conn in &baseline.connections {
            if pruned.contains(conn.source.as_str()) || pruned.contains(conn.target.as_str()) {
                continue;
            }
            let mut conn = conn.clone();
            if rng.r#gen::<f32>() < 0.3 * creativity {
                let factor = rng.gen_range((1.0 - 0.2 * creativity)..=(1.0 + 0.2 * creativity));
                conn.weight = (conn.weight * factor).max(MIN_CONNECTION_WEIGHT);
                mutated += 1;
            }
            connections.push(conn);
        }

        let mut seeds: Vec<ConceptSeed> = survivors.iter().map(|n| ConceptSeed::from(*n)).collect();

        let requested = options.new_concepts.unwrap_or_else(|| {
            planned_growth(survivors.len(), creativity, self.settings.max_growth_ratio)
        });
        let added = if survivors.is_empty() {
            if requested > 0 {
                debug!(map_id = %baseline.id, "Empty baseline, no parents to evolve from");
            }
            0
        } else {
            self.grow(
                &survivors,
                &mut seeds,
                &mut connections,
                requested,
                creativity,
                model,
                &mut rng,
            )?
        };

        let id = format!("{}{}", EVOLVED_PREFIX, baseline.id);
        let mut structure = self.builder.restructure(id, seeds, connections, model)?;

        let baseline_keys: HashSet<(String, String)> = baseline
            .connections
            .iter()
            .map(Connection::endpoint_key)
            .collect();
        let added_connections = structure
            .connections
            .iter()
            .filter(|c| !baseline_keys.contains(&c.endpoint_key()))
            .count();

        structure.evolution_metrics = Some(EvolutionMetrics {
            original_size: baseline.nodes.len(),
            new_size: structure.nodes.len(),
            novelty: novelty_score(
                added,
                added_connections,
                structure.nodes.len(),
                structure.connections.len(),
            ),
            added_nodes: added,
            pruned_nodes: pruned.len(),
            added_connections,
            mutated_connections: mutated,
            creativity_factor: creativity,
        });

        let (patterns, patterns_degraded) = match detect_emergent_patterns(baseline, &structure) {
            Ok(patterns) => (patterns, false),
            Err(e) => {
                warn!(map_id = %structure.id, error = %e, "Emergent pattern detection failed");
                (Vec::new(), true)
            }
        };

        Ok(EvolutionOutcome {
            structure,
            patterns,
            patterns_degraded,
        })
    }

    /// Isolated nodes below the relevance threshold, unless that would
    /// empty the map
    fn select_pruned<'a>(&self, baseline: &'a NeuralMapStructure) -> HashSet<&'a str> {
        let connected: HashSet<&str> = baseline
            .connections
            .iter()
            .flat_map(|c| [c.source.as_str(), c.target.as_str()])
            .collect();
        let pruned: HashSet<&str> = baseline
            .nodes
            .iter()
            .filter(|n| {
                n.relevance < self.settings.prune_relevance_threshold
                    && !connected.contains(n.id.as_str())
            })
            .map(|n| n.id.as_str())
            .collect();

        if pruned.len() == baseline.nodes.len() {
            HashSet::new()
        } else {
            pruned
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        survivors: &[&ConceptNode],
        seeds: &mut Vec<ConceptSeed>,
        connections: &mut Vec<Connection>,
        count: usize,
        creativity: f32,
        model: &NetworkModel,
        rng: &mut ChaCha8Rng,
    ) -> Result<usize> {
        let mut parents: Vec<&ConceptNode> = survivors.to_vec();
        parents.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let dimension = model.embedding_dimension;
        let spread = (0.25 + 1.25 * creativity) / (dimension as f32).sqrt();
        let noise = Normal::new(0.0f32, spread)
            .map_err(|e| Error::computation(format!("invalid mutation spread: {}", e)))?;
        let acceptance = model.min_similarity_threshold * (1.0 - 0.5 * creativity);
        let similarity = self.builder.similarity();

        let mut taken: HashSet<String> = seeds.iter().map(|s| s.id.clone()).collect();

        for k in 0..count {
            let parent = parents[k % parents.len()];
            let mut embedding: Vec<f32> = parent
                .embedding
                .iter()
                .map(|x| x + noise.sample(rng))
                .collect();
            normalize(&mut embedding);

            let id = unique_child_id(&parent.id, &taken);
            taken.insert(id.clone());

            let parent_sim = similarity.between(&embedding, &parent.embedding);
            connections.push(
                Connection::new(parent.id.clone(), id.clone(), parent_sim.max(MIN_CONNECTION_WEIGHT))
                    .with_statement(format!("evolved from {}", parent.label)),
            );

            let mut candidates: Vec<(usize, f32)> = seeds
                .iter()
                .enumerate()
                .filter(|(_, s)| s.id != parent.id)
                .map(|(i, s)| (i, similarity.between(&embedding, &s.embedding)))
                .filter(|(_, sim)| *sim >= acceptance)
                .collect();
            candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (i, sim) in candidates
                .into_iter()
                .take(self.settings.max_links_per_new_concept)
            {
                connections.push(
                    Connection::new(id.clone(), seeds[i].id.clone(), sim.max(MIN_CONNECTION_WEIGHT))
                        .with_statement(format!("emergent association {:.2}", sim)),
                );
            }

            seeds.push(
                ConceptSeed::new(id, format!("{} (variant {})", parent.label, k + 1), embedding)
                    .with_weight(parent.weight * 0.5),
            );
        }

        Ok(count)
    }
}

/// Compare an evolved map against its baseline and report clusters and
/// bridges that did not exist before
pub fn detect_emergent_patterns(
    baseline: &NeuralMapStructure,
    evolved: &NeuralMapStructure,
) -> Result<Vec<EmergentPattern>> {
    let baseline_cluster: HashMap<&str, &str> = baseline
        .clusters
        .iter()
        .flat_map(|c| c.node_ids.iter().map(move |id| (id.as_str(), c.id.as_str())))
        .collect();
    let evolved_ids: HashSet<&str> = evolved.nodes.iter().map(|n| n.id.as_str()).collect();

    let mut patterns = Vec::new();

    for cluster in &evolved.clusters {
        if let Some(missing) = cluster
            .node_ids
            .iter()
            .find(|id| !evolved_ids.contains(id.as_str()))
        {
            return Err(Error::computation(format!(
                "cluster {} references unknown node '{}'",
                cluster.id, missing
            )));
        }

        let origins: Vec<&str> = cluster
            .node_ids
            .iter()
            .filter_map(|id| baseline_cluster.get(id.as_str()).copied())
            .collect();
        let distinct: HashSet<&str> = origins.iter().copied().collect();

        if origins.is_empty() && !cluster.node_ids.is_empty() {
            patterns.push(EmergentPattern {
                kind: PatternKind::NovelCluster,
                node_ids: cluster.node_ids.clone(),
                description: format!(
                    "New cluster of {} concept(s) with no baseline counterpart",
                    cluster.node_ids.len()
                ),
                confidence: cluster.coherence,
            });
        } else if distinct.len() >= 2 {
            patterns.push(EmergentPattern {
                kind: PatternKind::ClusterFusion,
                node_ids: cluster.node_ids.clone(),
                description: format!(
                    "Cluster {} fuses concepts from {} baseline clusters",
                    cluster.id,
                    distinct.len()
                ),
                confidence: cluster.coherence,
            });
        }
    }

    for node in evolved
        .nodes
        .iter()
        .filter(|n| !baseline_cluster.contains_key(n.id.as_str()))
    {
        let links: Vec<(&str, f32)> = evolved
            .connections
            .iter()
            .filter(|c| c.touches(&node.id))
            .map(|c| {
                let other = if c.source == node.id { &c.target } else { &c.source };
                (other.as_str(), c.weight)
            })
            .filter(|(other, _)| baseline_cluster.contains_key(other))
            .collect();
        let reached: HashSet<&str> = links
            .iter()
            .filter_map(|(other, _)| baseline_cluster.get(other).copied())
            .collect();

        if reached.len() >= 2 {
            let mut node_ids = vec![node.id.clone()];
            node_ids.extend(links.iter().map(|(other, _)| other.to_string()));
            let mean_weight = links.iter().map(|(_, w)| *w).sum::<f32>() / links.len() as f32;
            patterns.push(EmergentPattern {
                kind: PatternKind::Bridge,
                node_ids,
                description: format!(
                    "'{}' bridges {} previously separate clusters",
                    node.label,
                    reached.len()
                ),
                confidence: mean_weight.clamp(0.0, 1.0),
            });
        }
    }

    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mindmap::model::{RawEdge, RawGraph, RawNode};
    use chrono::Utc;

    fn model(threshold: f32) -> NetworkModel {
        NetworkModel {
            user_id: "u".into(),
            context: "ctx".into(),
            embedding_dimension: 4,
            network_depth: 3,
            min_similarity_threshold: threshold,
            centroids: Vec::new(),
            built_at: Utc::now(),
        }
    }

    fn baseline(nodes: &[(&str, [f32; 4])], edges: &[(&str, &str)]) -> NeuralMapStructure {
        let raw = RawGraph::new(
            nodes.iter().map(|(id, _)| RawNode::new(*id, *id)).collect(),
            edges.iter().map(|(a, b)| RawEdge::new(*a, *b)).collect(),
        );
        let embeddings = nodes
            .iter()
            .map(|(id, v)| (id.to_string(), v.to_vec()))
            .collect();
        MapStructureBuilder::default()
            .build(&raw, &embeddings, &model(0.8))
            .unwrap()
            .0
    }

    #[test]
    fn test_planned_growth_policy() {
        assert_eq!(planned_growth(0, 1.0, 0.5), 0);
        assert_eq!(planned_growth(10, 0.0, 0.5), 0);
        assert_eq!(planned_growth(1, 0.8, 0.5), 1);
        assert_eq!(planned_growth(10, 0.5, 0.5), 3);
    }

    #[test]
    fn test_novelty_score_bounds() {
        assert_eq!(novelty_score(0, 0, 0, 0), 0.0);
        assert_eq!(novelty_score(2, 2, 2, 2), 1.0);
        assert!((novelty_score(1, 1, 4, 4) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_single_node_gains_exactly_requested_concept() {
        let base = baseline(&[("node1", [1.0, 0.0, 0.0, 0.0])], &[]);
        let outcome = EvolutionEngine::default()
            .evolve(
                &base,
                &model(0.8),
                &EvolveOptions::with_creativity(0.8).with_new_concepts(1),
            )
            .unwrap();

        let evolved = &outcome.structure;
        assert_eq!(evolved.nodes.len(), 2);
        assert!(evolved.contains_node("node1"));
        assert!(evolved.contains_node("node1-evo-1"));
        assert!(evolved.id.starts_with(EVOLVED_PREFIX));
        assert!(evolved.id.ends_with(&base.id));

        let metrics = evolved.evolution_metrics.as_ref().unwrap();
        assert_eq!(metrics.original_size, 1);
        assert_eq!(metrics.new_size, 2);
        assert_eq!(metrics.added_nodes, 1);
        assert!((0.0..=1.0).contains(&metrics.novelty));
        assert!(evolved.validate_invariants().is_ok());
    }

    #[test]
    fn test_evolution_is_deterministic() {
        let base = baseline(
            &[
                ("a", [1.0, 0.0, 0.0, 0.0]),
                ("b", [0.0, 1.0, 0.0, 0.0]),
                ("c", [0.0, 0.0, 1.0, 0.0]),
            ],
            &[("a", "b"), ("b", "c")],
        );
        let engine = EvolutionEngine::default();
        let options = EvolveOptions::with_creativity(0.6);
        let first = engine.evolve(&base, &model(0.8), &options).unwrap();
        let second = engine.evolve(&base, &model(0.8), &options).unwrap();

        assert_eq!(first.structure.nodes, second.structure.nodes);
        assert_eq!(first.structure.connections, second.structure.connections);
    }

    #[test]
    fn test_higher_creativity_grows_more() {
        let nodes: Vec<(String, [f32; 4])> = (0..8)
            .map(|i| (format!("n{}", i), [1.0, i as f32, 0.5, 0.0]))
            .collect();
        let refs: Vec<(&str, [f32; 4])> = nodes.iter().map(|(id, v)| (id.as_str(), *v)).collect();
        let base = baseline(&refs, &[("n0", "n1")]);
        let engine = EvolutionEngine::default();

        let calm = engine
            .evolve(&base, &model(0.8), &EvolveOptions::with_creativity(0.2))
            .unwrap();
        let wild = engine
            .evolve(&base, &model(0.8), &EvolveOptions::with_creativity(1.0))
            .unwrap();

        let calm_added = calm.structure.evolution_metrics.unwrap().added_nodes;
        let wild_added = wild.structure.evolution_metrics.unwrap().added_nodes;
        assert!(wild_added > calm_added);
    }

    #[test]
    fn test_zero_creativity_adds_nothing() {
        let base = baseline(
            &[("a", [1.0, 0.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0, 0.0])],
            &[("a", "b")],
        );
        let outcome = EvolutionEngine::default()
            .evolve(&base, &model(0.8), &EvolveOptions::with_creativity(0.0))
            .unwrap();
        let metrics = outcome.structure.evolution_metrics.unwrap();
        assert_eq!(metrics.added_nodes, 0);
        assert_eq!(metrics.mutated_connections, 0);
        assert_eq!(metrics.novelty, 0.0);
    }

    #[test]
    fn test_creativity_out_of_range_is_rejected() {
        let base = baseline(&[("a", [1.0, 0.0, 0.0, 0.0])], &[]);
        let err = EvolutionEngine::default()
            .evolve(&base, &model(0.8), &EvolveOptions::with_creativity(1.5))
            .unwrap_err();
        assert_eq!(err.code(), "E100");
    }

    #[test]
    fn test_isolated_irrelevant_nodes_are_pruned() {
        let mut base = baseline(
            &[
                ("a", [1.0, 0.0, 0.0, 0.0]),
                ("b", [0.0, 1.0, 0.0, 0.0]),
                ("c", [0.0, 0.0, 1.0, 0.0]),
            ],
            &[("a", "b")],
        );
        base.nodes[2].relevance = 0.01;

        let outcome = EvolutionEngine::default()
            .evolve(
                &base,
                &model(0.8),
                &EvolveOptions::with_creativity(0.0),
            )
            .unwrap();
        assert!(!outcome.structure.contains_node("c"));
        assert_eq!(outcome.structure.evolution_metrics.unwrap().pruned_nodes, 1);
    }

    #[test]
    fn test_detects_novel_cluster() {
        let base = baseline(&[("a", [1.0, 0.0, 0.0, 0.0])], &[]);
        let mut evolved = baseline(
            &[("a", [1.0, 0.0, 0.0, 0.0]), ("z", [0.0, 0.0, 0.0, 1.0])],
            &[],
        );
        evolved.id = "evolved".into();

        let patterns = detect_emergent_patterns(&base, &evolved).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::NovelCluster);
        assert_eq!(patterns[0].node_ids, vec!["z"]);
    }

    #[test]
    fn test_detects_bridge() {
        let base = baseline(
            &[("a", [1.0, 0.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0, 0.0])],
            &[],
        );
        let evolved = baseline(
            &[
                ("a", [1.0, 0.0, 0.0, 0.0]),
                ("b", [0.0, 1.0, 0.0, 0.0]),
                ("z", [0.0, 0.0, 1.0, 0.0]),
            ],
            &[("z", "a"), ("z", "b")],
        );

        let patterns = detect_emergent_patterns(&base, &evolved).unwrap();
        assert!(patterns.iter().any(|p| p.kind == PatternKind::Bridge));
    }

    #[test]
    fn test_corrupt_cluster_fails_detection() {
        let base = baseline(&[("a", [1.0, 0.0, 0.0, 0.0])], &[]);
        let mut evolved = base.clone();
        evolved.clusters[0].node_ids.push("ghost".into());
        assert!(detect_emergent_patterns(&base, &evolved).is_err());
    }
}
