//! In-memory graph store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::mindmap::{FetchOptions, GraphStore, MapKey, RawEdge, RawGraph, RawNode};
use crate::error::Result;

/// Raw concept graphs held in memory, keyed by user and context
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graphs: RwLock<HashMap<MapKey, RawGraph>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the graph for a context
    pub async fn insert_graph(&self, user_id: &str, context: &str, graph: RawGraph) {
        self.graphs
            .write()
            .await
            .insert(MapKey::new(user_id, context), graph);
    }

    /// Append nodes and edges to a context's graph, creating it if needed
    pub async fn extend_graph(
        &self,
        user_id: &str,
        context: &str,
        nodes: Vec<RawNode>,
        edges: Vec<RawEdge>,
    ) {
        let mut graphs = self.graphs.write().await;
        let graph = graphs.entry(MapKey::new(user_id, context)).or_default();
        graph.nodes.extend(nodes);
        graph.edges.extend(edges);
    }

    pub async fn remove_graph(&self, user_id: &str, context: &str) -> Option<RawGraph> {
        self.graphs
            .write()
            .await
            .remove(&MapKey::new(user_id, context))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn fetch_graph(
        &self,
        user_id: &str,
        context: &str,
        options: &FetchOptions,
    ) -> Result<RawGraph> {
        let graphs = self.graphs.read().await;
        let Some(graph) = graphs.get(&MapKey::new(user_id, context)) else {
            debug!(user_id = %user_id, context = %context, "No stored graph, returning empty");
            return Ok(RawGraph::default());
        };

        let mut graph = graph.clone();
        if let Some(max) = options.max_nodes {
            graph.nodes.truncate(max);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_context_is_empty() {
        let store = InMemoryGraphStore::new();
        let graph = store
            .fetch_graph("u", "missing", &FetchOptions::default())
            .await
            .unwrap();
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_insert_extend_and_limit() {
        let store = InMemoryGraphStore::new();
        store
            .insert_graph("u", "ctx", RawGraph::new(vec![RawNode::new("a", "A")], vec![]))
            .await;
        store
            .extend_graph(
                "u",
                "ctx",
                vec![RawNode::new("b", "B")],
                vec![RawEdge::new("a", "b")],
            )
            .await;

        let full = store
            .fetch_graph("u", "ctx", &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(full.nodes.len(), 2);
        assert_eq!(full.edges.len(), 1);

        let limited = store
            .fetch_graph(
                "u",
                "ctx",
                &FetchOptions {
                    max_nodes: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.nodes.len(), 1);
    }
}
