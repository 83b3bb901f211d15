//! Insights derived from map structure alone

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::mindmap::{
    EmergentPattern, Insight, InsightGenerator, InsightType, NeuralMapStructure,
};
use crate::error::Result;

/// Reports hubs, tight clusters, isolated concepts and emergent patterns
#[derive(Debug, Clone)]
pub struct StructuralInsightGenerator {
    /// Betweenness a node needs to be reported as a hub
    pub hub_threshold: f32,
}

impl Default for StructuralInsightGenerator {
    fn default() -> Self {
        Self { hub_threshold: 0.2 }
    }
}

#[async_trait]
impl InsightGenerator for StructuralInsightGenerator {
    async fn generate_insights(
        &self,
        structure: &NeuralMapStructure,
        patterns: &[EmergentPattern],
    ) -> Result<Vec<Insight>> {
        let metrics = &structure.cognitive_metrics;
        let mut insights = vec![Insight {
            description: format!(
                "{} concepts in {} clusters across {} layers (complexity {:.2})",
                metrics.node_count,
                metrics.cluster_count,
                metrics.layer_count,
                metrics.cognitive_complexity_score
            ),
            insight_type: InsightType::Structure,
            confidence: 1.0,
        }];

        if let Some(hub) = structure
            .nodes
            .iter()
            .filter(|n| n.betweenness >= self.hub_threshold)
            .max_by(|a, b| a.betweenness.total_cmp(&b.betweenness))
        {
            insights.push(Insight {
                description: format!("'{}' is a hub linking otherwise distant concepts", hub.label),
                insight_type: InsightType::Hub,
                confidence: hub.betweenness.clamp(0.0, 1.0),
            });
        }

        if let Some(cluster) = structure
            .clusters
            .iter()
            .filter(|c| c.node_ids.len() > 1)
            .max_by(|a, b| a.coherence.total_cmp(&b.coherence))
        {
            insights.push(Insight {
                description: format!(
                    "{} concepts form a tight theme ({})",
                    cluster.node_ids.len(),
                    cluster.id
                ),
                insight_type: InsightType::Cluster,
                confidence: cluster.coherence,
            });
        }

        let connected: HashSet<&str> = structure
            .connections
            .iter()
            .flat_map(|c| [c.source.as_str(), c.target.as_str()])
            .collect();
        let isolated = structure
            .nodes
            .iter()
            .filter(|n| !connected.contains(n.id.as_str()))
            .count();
        if isolated > 0 && structure.nodes.len() > 1 {
            insights.push(Insight {
                description: format!("{} concept(s) have no connections yet", isolated),
                insight_type: InsightType::Gap,
                confidence: isolated as f32 / structure.nodes.len() as f32,
            });
        }

        insights.extend(patterns.iter().map(|p| Insight {
            description: p.description.clone(),
            insight_type: InsightType::Emergence,
            confidence: p.confidence,
        }));

        Ok(insights)
    }
}
