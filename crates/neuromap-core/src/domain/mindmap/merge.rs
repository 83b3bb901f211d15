//! Merge engine
//!
//! Folds two or more per-context maps into one structure. Concepts from
//! different sources that are similar enough are coalesced into a single
//! node; everything else is carried over, renamed when ids collide.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::builder::{ConceptSeed, MapStructureBuilder};
use super::model::{Connection, NeuralMapStructure};
use super::similarity::normalize;
use crate::config::{MergeConfig, WeightPolicy};
use crate::domain::network::{NetworkModel, NetworkOverrides};
use crate::error::{Error, Result};

/// Prefix marking merged map ids
pub const MERGED_PREFIX: &str = "merged-";

pub const TOO_FEW_SOURCES: &str = "At least two context names are required for merging";

/// Per-call merge parameters; unset fields fall back to configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub coalesce_threshold: Option<f32>,
    pub weight_policy: Option<WeightPolicy>,
    /// Network parameters for the target context; the embedding dimension
    /// defaults to the sources'
    pub network: Option<NetworkOverrides>,
}

/// One stored map taking part in a merge
#[derive(Debug, Clone, Copy)]
pub struct MergeSource<'a> {
    pub context: &'a str,
    pub structure: &'a NeuralMapStructure,
}

/// Check the source list names at least two distinct contexts and return
/// them deduplicated in first-seen order
pub fn distinct_sources(contexts: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = contexts
        .iter()
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect();
    if distinct.len() < 2 {
        return Err(Error::validation(TOO_FEW_SOURCES));
    }
    Ok(distinct)
}

struct MergedConcept {
    id: String,
    label: String,
    relevance: f32,
    weight: f32,
    sum: Vec<f32>,
    embedding: Vec<f32>,
    sources: HashSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
    builder: MapStructureBuilder,
}

impl MergeEngine {
    pub fn new(config: MergeConfig, builder: MapStructureBuilder) -> Self {
        Self { config, builder }
    }

    /// Merge `sources` into a new structure owned by `model`'s context
    pub fn merge(
        &self,
        sources: &[MergeSource<'_>],
        model: &NetworkModel,
        options: &MergeOptions,
    ) -> Result<NeuralMapStructure> {
        let contexts: Vec<String> = sources.iter().map(|s| s.context.to_string()).collect();
        if distinct_sources(&contexts)?.len() != sources.len() {
            return Err(Error::validation("merge sources must name distinct contexts"));
        }
        for source in sources {
            if source.structure.embedding_dimension != model.embedding_dimension {
                return Err(Error::validation(format!(
                    "context '{}' uses embedding dimension {}, expected {}",
                    source.context, source.structure.embedding_dimension, model.embedding_dimension
                )));
            }
        }

        let threshold = options
            .coalesce_threshold
            .unwrap_or_else(|| self.config.effective_threshold(model.min_similarity_threshold));
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::validation(format!(
                "coalesce threshold {} must be between 0.0 and 1.0",
                threshold
            )));
        }
        let policy = options.weight_policy.unwrap_or(self.config.weight_policy);
        let similarity = self.builder.similarity();

        let mut merged: Vec<MergedConcept> = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut remap: HashMap<(usize, &str), usize> = HashMap::new();
        let mut coalesced = 0;

        for (si, source) in sources.iter().enumerate() {
            for node in &source.structure.nodes {
                let best = merged
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| !m.sources.contains(&si))
                    .map(|(i, m)| (i, similarity.between(&node.embedding, &m.embedding)))
                    .filter(|(_, sim)| *sim > threshold)
                    .fold(None::<(usize, f32)>, |best, (i, sim)| match best {
                        Some((b, bsim))
                            if bsim > sim || (bsim == sim && merged[b].id <= merged[i].id) =>
                        {
                            Some((b, bsim))
                        }
                        _ => Some((i, sim)),
                    });

                match best {
                    Some((i, sim)) => {
                        let target = &mut merged[i];
                        if node.relevance > target.relevance {
                            target.label = node.label.clone();
                            target.relevance = node.relevance;
                        }
                        target.weight = policy.combine(target.weight, node.weight);
                        for (acc, x) in target.sum.iter_mut().zip(&node.embedding) {
                            *acc += x;
                        }
                        target.embedding = target.sum.clone();
                        normalize(&mut target.embedding);
                        target.sources.insert(si);
                        remap.insert((si, node.id.as_str()), i);
                        coalesced += 1;
                        debug!(
                            node_id = %node.id,
                            into = %target.id,
                            similarity = sim,
                            "Coalesced concept"
                        );
                    }
                    None => {
                        let id = unique_id(&node.id, source.context, &taken);
                        taken.insert(id.clone());
                        remap.insert((si, node.id.as_str()), merged.len());
                        merged.push(MergedConcept {
                            id,
                            label: node.label.clone(),
                            relevance: node.relevance,
                            weight: node.weight,
                            sum: node.embedding.clone(),
                            embedding: node.embedding.clone(),
                            sources: HashSet::from([si]),
                        });
                    }
                }
            }
        }

        let mut connections: Vec<Connection> = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        for (si, source) in sources.iter().enumerate() {
            for conn in &source.structure.connections {
                let (Some(&a), Some(&b)) = (
                    remap.get(&(si, conn.source.as_str())),
                    remap.get(&(si, conn.target.as_str())),
                ) else {
                    return Err(Error::computation(format!(
                        "connection {} -> {} in context '{}' references a missing node",
                        conn.source, conn.target, source.context
                    )));
                };
                if a == b {
                    continue;
                }
                let mut mapped =
                    Connection::new(merged[a].id.clone(), merged[b].id.clone(), conn.weight);
                mapped.statement = conn.statement.clone();
                let key = mapped.endpoint_key();
                match seen.get(&key) {
                    Some(&i) => {
                        connections[i].weight = policy.combine(connections[i].weight, mapped.weight);
                        if connections[i].statement.is_none() {
                            connections[i].statement = mapped.statement;
                        }
                    }
                    None => {
                        seen.insert(key, connections.len());
                        connections.push(mapped);
                    }
                }
            }
        }

        let seeds: Vec<ConceptSeed> = merged
            .into_iter()
            .map(|m| ConceptSeed::new(m.id, m.label, m.embedding).with_weight(m.weight))
            .collect();

        let structure = self.builder.restructure(
            format!("{}{}", MERGED_PREFIX, Uuid::new_v4()),
            seeds,
            connections,
            model,
        )?;

        debug!(
            map_id = %structure.id,
            sources = sources.len(),
            nodes = structure.nodes.len(),
            coalesced,
            "Merged map structures"
        );

        Ok(structure)
    }
}

fn unique_id(id: &str, context: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(id) {
        return id.to_string();
    }
    let renamed = format!("{}@{}", id, context);
    if !taken.contains(&renamed) {
        return renamed;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}#{}", renamed, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
