//! Map structure builder
//!
//! Turns a raw concept graph plus per-node embeddings into a
//! [`NeuralMapStructure`]:
//!
//! 1. validate the raw graph (dangling edges and self-loops are dropped)
//! 2. attach embeddings, excluding nodes without a usable vector
//! 3. greedy single-pass clustering against running centroids; clusters
//!    matching one the network model remembers keep its id
//! 4. similarity enrichment inside clusters (optional)
//! 5. layer assignment by structural centrality
//! 6. per-node betweenness/relevance and map-level cognitive metrics
//!
//! Steps 3-6 are exposed as [`MapStructureBuilder::restructure`] so evolution
//! and merge recompute structure exactly the way generation does.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::model::{
    CognitiveMetrics, Cluster, ConceptNode, Connection, Layer, NeuralMapStructure, RawGraph,
};
use super::similarity::{Similarity, mean_vector};
use crate::config::EngineConfig;
use crate::domain::network::{ClusterCentroid, NetworkModel};
use crate::error::{Error, Result};

/// Smallest weight a connection may carry
pub const MIN_CONNECTION_WEIGHT: f32 = 0.01;

/// Default weight of raw nodes and edges that carry none
pub const DEFAULT_WEIGHT: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub enrich_similarity_edges: bool,
    pub max_enrichment_edges_per_node: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for BuildSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            enrich_similarity_edges: config.enrich_similarity_edges,
            max_enrichment_edges_per_node: config.max_enrichment_edges_per_node,
        }
    }
}

/// An embedded concept waiting to be placed into a structure
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptSeed {
    pub id: String,
    pub label: String,
    pub embedding: Vec<f32>,
    pub weight: f32,
}

impl ConceptSeed {
    pub fn new(id: impl Into<String>, label: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            embedding,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

impl From<&ConceptNode> for ConceptSeed {
    fn from(node: &ConceptNode) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            embedding: node.embedding.clone(),
            weight: node.weight,
        }
    }
}

/// Diagnostics from one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub input_nodes: usize,
    pub input_edges: usize,
    /// Nodes left out because no embedding of the right dimension was available
    pub excluded_nodes: Vec<String>,
    /// Edges whose endpoints are missing or excluded
    pub dropped_edges: usize,
    pub self_loops: usize,
    pub enriched_connections: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MapStructureBuilder {
    settings: BuildSettings,
    similarity: Similarity,
}

impl MapStructureBuilder {
    pub fn new(settings: BuildSettings) -> Self {
        Self {
            settings,
            similarity: Similarity::default(),
        }
    }

    /// Measure embeddings with `similarity` instead of cosine
    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn similarity(&self) -> &Similarity {
        &self.similarity
    }

    /// Build a fresh structure from a raw graph and embeddings keyed by node id
    pub fn build(
        &self,
        raw: &RawGraph,
        embeddings: &HashMap<String, Vec<f32>>,
        model: &NetworkModel,
    ) -> Result<(NeuralMapStructure, BuildReport)> {
        let mut report = BuildReport {
            input_nodes: raw.nodes.len(),
            input_edges: raw.edges.len(),
            ..Default::default()
        };

        let mut raw_ids = HashSet::with_capacity(raw.nodes.len());
        let mut seeds = Vec::with_capacity(raw.nodes.len());
        for node in &raw.nodes {
            if !raw_ids.insert(node.id.as_str()) {
                return Err(Error::computation(format!(
                    "raw graph contains duplicate node id '{}'",
                    node.id
                )));
            }
            let weight = checked_weight(node.weight, &format!("node '{}'", node.id))?;
            if weight < 0.0 {
                return Err(Error::computation(format!(
                    "node '{}' has negative weight {}",
                    node.id, weight
                )));
            }

            match embeddings.get(&node.id) {
                Some(embedding)
                    if embedding.len() == model.embedding_dimension
                        && embedding.iter().all(|v| v.is_finite()) =>
                {
                    seeds.push(ConceptSeed {
                        id: node.id.clone(),
                        label: node.label.clone(),
                        embedding: embedding.clone(),
                        weight,
                    });
                }
                _ => report.excluded_nodes.push(node.id.clone()),
            }
        }

        let included: HashSet<&str> = seeds.iter().map(|s| s.id.as_str()).collect();
        let mut connections = Vec::with_capacity(raw.edges.len());
        for edge in &raw.edges {
            let weight = checked_weight(
                edge.weight,
                &format!("edge {} -> {}", edge.source, edge.target),
            )?;
            if edge.source == edge.target {
                report.self_loops += 1;
                continue;
            }
            if !included.contains(edge.source.as_str()) || !included.contains(edge.target.as_str())
            {
                report.dropped_edges += 1;
                continue;
            }
            let mut conn = Connection::new(
                edge.source.clone(),
                edge.target.clone(),
                weight.max(MIN_CONNECTION_WEIGHT),
            );
            conn.statement = edge.statement.clone();
            connections.push(conn);
        }

        let (structure, enriched) =
            self.assemble(Uuid::new_v4().to_string(), seeds, connections, model)?;
        report.enriched_connections = enriched;

        debug!(
            map_id = %structure.id,
            nodes = structure.nodes.len(),
            excluded = report.excluded_nodes.len(),
            dropped_edges = report.dropped_edges,
            "Built map structure"
        );

        Ok((structure, report))
    }

    /// Recompute clusters, layers and metrics over already embedded concepts
    pub fn restructure(
        &self,
        id: impl Into<String>,
        seeds: Vec<ConceptSeed>,
        connections: Vec<Connection>,
        model: &NetworkModel,
    ) -> Result<NeuralMapStructure> {
        let mut ids = HashSet::with_capacity(seeds.len());
        for seed in &seeds {
            if !ids.insert(seed.id.as_str()) {
                return Err(Error::computation(format!(
                    "duplicate concept id '{}'",
                    seed.id
                )));
            }
            if seed.embedding.len() != model.embedding_dimension {
                return Err(Error::computation(format!(
                    "concept '{}' has embedding dimension {}, expected {}",
                    seed.id,
                    seed.embedding.len(),
                    model.embedding_dimension
                )));
            }
        }
        for conn in &connections {
            if !ids.contains(conn.source.as_str()) || !ids.contains(conn.target.as_str()) {
                return Err(Error::computation(format!(
                    "connection {} -> {} references a missing concept",
                    conn.source, conn.target
                )));
            }
        }

        self.assemble(id.into(), seeds, connections, model)
            .map(|(structure, _)| structure)
    }

    fn assemble(
        &self,
        id: String,
        seeds: Vec<ConceptSeed>,
        connections: Vec<Connection>,
        model: &NetworkModel,
    ) -> Result<(NeuralMapStructure, usize)> {
        let n = seeds.len();
        let index: HashMap<&str, usize> = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        let mut connections = dedupe_connections(connections);

        let assignment = cluster_greedy(&seeds, model.min_similarity_threshold, &self.similarity);
        let cluster_count = assignment.iter().copied().max().map_or(0, |m| m + 1);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); cluster_count];
        for (i, &c) in assignment.iter().enumerate() {
            members[c].push(i);
        }

        let enriched = if self.settings.enrich_similarity_edges {
            enrich_within_clusters(
                &seeds,
                &members,
                &mut connections,
                &self.similarity,
                model.min_similarity_threshold,
                self.settings.max_enrichment_edges_per_node,
            )
        } else {
            0
        };

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for conn in &connections {
            let (a, b) = match (index.get(conn.source.as_str()), index.get(conn.target.as_str())) {
                (Some(&a), Some(&b)) => (a, b),
                _ => {
                    return Err(Error::computation(format!(
                        "connection {} -> {} lost its endpoints",
                        conn.source, conn.target
                    )));
                }
            };
            adjacency[a].push(b);
            adjacency[b].push(a);
        }

        let centrality: Vec<f32> = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| (adjacency[i].len() as f32 + 1.0) * s.weight)
            .collect();
        let layer_of = assign_layers(&centrality, model.network_depth);
        let betweenness = betweenness_centrality(&adjacency);

        let centroids: Vec<Vec<f32>> = members
            .iter()
            .map(|idxs| {
                mean_vector(
                    idxs.iter().map(|&i| seeds[i].embedding.as_slice()),
                    model.embedding_dimension,
                )
            })
            .collect();
        let cluster_ids = stable_cluster_ids(
            &centroids,
            &model.centroids,
            model.min_similarity_threshold,
            &self.similarity,
        );
        let clusters: Vec<Cluster> = members
            .iter()
            .zip(centroids)
            .zip(cluster_ids)
            .map(|((idxs, centroid), id)| Cluster {
                id,
                node_ids: idxs.iter().map(|&i| seeds[i].id.clone()).collect(),
                coherence: coherence(&seeds, idxs, &self.similarity),
                centroid,
            })
            .collect();

        let max_centrality = centrality.iter().copied().fold(0.0f32, f32::max);
        let nodes: Vec<ConceptNode> = seeds
            .into_iter()
            .enumerate()
            .map(|(i, seed)| {
                let cluster = &clusters[assignment[i]];
                let normalized = if max_centrality > 0.0 {
                    centrality[i] / max_centrality
                } else {
                    1.0
                };
                let fit = self.similarity.between(&seed.embedding, &cluster.centroid).max(0.0);
                ConceptNode {
                    id: seed.id,
                    label: seed.label,
                    embedding: seed.embedding,
                    weight: seed.weight,
                    community_id: cluster.id.clone(),
                    betweenness: betweenness[i],
                    relevance: 0.5 * normalized + 0.5 * fit,
                    layer_index: layer_of[i],
                }
            })
            .collect();

        let layers: Vec<Layer> = (0..model.network_depth)
            .map(|depth| Layer {
                depth,
                node_ids: nodes
                    .iter()
                    .filter(|n| n.layer_index == depth)
                    .map(|n| n.id.clone())
                    .collect(),
            })
            .filter(|l| !l.node_ids.is_empty())
            .collect();

        let cognitive_metrics =
            CognitiveMetrics::compute(nodes.len(), connections.len(), &clusters, layers.len());

        let structure = NeuralMapStructure {
            id,
            context: model.context.clone(),
            embedding_dimension: model.embedding_dimension,
            network_depth: model.network_depth,
            nodes,
            connections,
            layers,
            clusters,
            cognitive_metrics,
            evolution_metrics: None,
            created_at: Utc::now(),
        };

        Ok((structure, enriched))
    }
}

fn checked_weight(weight: Option<f64>, what: &str) -> Result<f32> {
    match weight {
        None => Ok(DEFAULT_WEIGHT),
        Some(w) if w.is_finite() => Ok(w as f32),
        Some(w) => Err(Error::computation(format!(
            "{} has non-numeric weight {}",
            what, w
        ))),
    }
}

fn cluster_id(index: usize) -> String {
    format!("cluster-{}", index)
}

/// Name clusters in order. Each takes the id of the most similar remembered
/// cluster still unclaimed when the similarity exceeds `threshold`; the rest
/// get the lowest free `cluster-<n>` ids.
fn stable_cluster_ids(
    centroids: &[Vec<f32>],
    known: &[ClusterCentroid],
    threshold: f32,
    similarity: &Similarity,
) -> Vec<String> {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut matched: Vec<Option<String>> = Vec::with_capacity(centroids.len());

    for centroid in centroids {
        let mut best: Option<(&ClusterCentroid, f32)> = None;
        for candidate in known {
            if candidate.centroid.len() != centroid.len()
                || claimed.contains(candidate.cluster_id.as_str())
            {
                continue;
            }
            let sim = similarity.between(centroid, &candidate.centroid);
            if sim > threshold && best.is_none_or(|(_, s)| sim > s) {
                best = Some((candidate, sim));
            }
        }
        matched.push(best.map(|(candidate, _)| {
            claimed.insert(candidate.cluster_id.as_str());
            candidate.cluster_id.clone()
        }));
    }

    let mut next = 0;
    matched
        .into_iter()
        .map(|id| {
            id.unwrap_or_else(|| loop {
                let candidate = cluster_id(next);
                next += 1;
                if !claimed.contains(candidate.as_str()) {
                    break candidate;
                }
            })
        })
        .collect()
}

/// Collapse undirected duplicates (keeping the first endpoint order and the
/// strongest weight) and drop self-loops
pub(crate) fn dedupe_connections(connections: Vec<Connection>) -> Vec<Connection> {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut out: Vec<Connection> = Vec::with_capacity(connections.len());
    for conn in connections {
        if conn.source == conn.target {
            continue;
        }
        match seen.get(&conn.endpoint_key()) {
            Some(&i) => {
                if conn.weight > out[i].weight {
                    out[i].weight = conn.weight;
                }
                if out[i].statement.is_none() {
                    out[i].statement = conn.statement;
                }
            }
            None => {
                seen.insert(conn.endpoint_key(), out.len());
                out.push(conn);
            }
        }
    }
    out
}

/// Single pass over seeds in order. Each seed joins the cluster whose running
/// centroid it is most similar to when that similarity exceeds `threshold`
/// (earlier clusters win ties); otherwise it seeds a new cluster.
pub fn cluster_greedy(
    seeds: &[ConceptSeed],
    threshold: f32,
    similarity: &Similarity,
) -> Vec<usize> {
    let mut centroids: Vec<(Vec<f32>, usize)> = Vec::new();
    let mut assignment = Vec::with_capacity(seeds.len());

    for seed in seeds {
        let mut best: Option<(usize, f32)> = None;
        for (c, (centroid, _)) in centroids.iter().enumerate() {
            let sim = similarity.between(&seed.embedding, centroid);
            if best.is_none_or(|(_, s)| sim > s) {
                best = Some((c, sim));
            }
        }

        match best {
            Some((c, sim)) if sim > threshold => {
                let (centroid, count) = &mut centroids[c];
                *count += 1;
                let n = *count as f32;
                for (mean, x) in centroid.iter_mut().zip(seed.embedding.iter()) {
                    *mean += (x - *mean) / n;
                }
                assignment.push(c);
            }
            _ => {
                centroids.push((seed.embedding.clone(), 1));
                assignment.push(centroids.len() - 1);
            }
        }
    }

    assignment
}

/// Rank by centrality (stable on ties) and cut the ranking into `depth`
/// even bands, most central first
pub fn assign_layers(centrality: &[f32], depth: usize) -> Vec<usize> {
    let n = centrality.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        centrality[b]
            .partial_cmp(&centrality[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut layer_of = vec![0; n];
    for (rank, &i) in order.iter().enumerate() {
        layer_of[i] = (rank * depth / n).min(depth.saturating_sub(1));
    }
    layer_of
}

fn coherence(seeds: &[ConceptSeed], members: &[usize], similarity: &Similarity) -> f32 {
    if members.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (k, &i) in members.iter().enumerate() {
        for &j in &members[k + 1..] {
            total += similarity.between(&seeds[i].embedding, &seeds[j].embedding);
            pairs += 1;
        }
    }
    (total / pairs as f32).clamp(0.0, 1.0)
}

fn enrich_within_clusters(
    seeds: &[ConceptSeed],
    members: &[Vec<usize>],
    connections: &mut Vec<Connection>,
    similarity: &Similarity,
    threshold: f32,
    max_per_node: usize,
) -> usize {
    if max_per_node == 0 {
        return 0;
    }
    let mut existing: HashSet<(String, String)> =
        connections.iter().map(Connection::endpoint_key).collect();
    let mut added_per_node = vec![0usize; seeds.len()];
    let mut added = 0;

    for idxs in members {
        for (k, &i) in idxs.iter().enumerate() {
            for &j in &idxs[k + 1..] {
                if added_per_node[i] >= max_per_node || added_per_node[j] >= max_per_node {
                    continue;
                }
                let sim = similarity.between(&seeds[i].embedding, &seeds[j].embedding);
                if sim <= threshold {
                    continue;
                }
                let conn = Connection::new(
                    seeds[i].id.clone(),
                    seeds[j].id.clone(),
                    sim.max(MIN_CONNECTION_WEIGHT),
                )
                .with_statement(format!("semantic similarity {:.2}", sim));
                if existing.insert(conn.endpoint_key()) {
                    connections.push(conn);
                    added_per_node[i] += 1;
                    added_per_node[j] += 1;
                    added += 1;
                }
            }
        }
    }
    added
}

/// Normalized betweenness centrality (Brandes) over an undirected,
/// unweighted adjacency list
pub fn betweenness_centrality(adjacency: &[Vec<usize>]) -> Vec<f32> {
    let n = adjacency.len();
    let mut scores = vec![0.0f64; n];

    for s in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::from([s]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    preds[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &preds[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s {
                scores[w] += delta[w];
            }
        }
    }

    // Each undirected pair is counted from both ends
    let scale = if n > 2 {
        1.0 / ((n - 1) * (n - 2)) as f64
    } else {
        0.0
    };
    scores.into_iter().map(|b| (b * scale) as f32).collect()
}
