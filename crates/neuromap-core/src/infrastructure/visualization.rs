//! Force-directed graph payload
//!
//! Renders a map into the `{nodes, links}` shape force-graph front ends
//! consume, with clusters as groups and layers as levels.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::mindmap::{NeuralMapStructure, VisualizationAdapter};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ForceGraphAdapter {
    pub include_embeddings: bool,
}

#[async_trait]
impl VisualizationAdapter for ForceGraphAdapter {
    async fn render(&self, structure: &NeuralMapStructure) -> Result<Value> {
        let nodes: Vec<Value> = structure
            .nodes
            .iter()
            .map(|n| {
                let mut node = json!({
                    "id": n.id,
                    "label": n.label,
                    "group": n.community_id,
                    "level": n.layer_index,
                    "value": n.weight,
                    "relevance": n.relevance,
                    "betweenness": n.betweenness,
                });
                if self.include_embeddings {
                    node["embedding"] = json!(n.embedding);
                }
                node
            })
            .collect();

        let links: Vec<Value> = structure
            .connections
            .iter()
            .map(|c| {
                json!({
                    "source": c.source,
                    "target": c.target,
                    "value": c.weight,
                    "label": c.statement,
                })
            })
            .collect();

        Ok(json!({
            "id": structure.id,
            "context": structure.context,
            "nodes": nodes,
            "links": links,
            "groups": structure.clusters.iter().map(|c| &c.id).collect::<Vec<_>>(),
            "levels": structure.network_depth,
            "metrics": structure.cognitive_metrics,
        }))
    }
}
