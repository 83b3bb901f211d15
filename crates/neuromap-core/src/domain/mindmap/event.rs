//! Domain events for mind maps
//!
//! Published on the engine's broadcast channel after each committed change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evolution::PatternKind;

/// Events that can occur while building and reshaping mind maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MindMapEvent {
    /// A map was generated from a raw graph and stored
    MapGenerated {
        user_id: String,
        context: String,
        map_id: String,
        node_count: usize,
        connection_count: usize,
        timestamp: DateTime<Utc>,
    },
    /// A stored map was replaced by its evolved successor
    MapEvolved {
        user_id: String,
        context: String,
        map_id: String,
        baseline_id: String,
        novelty: f32,
        timestamp: DateTime<Utc>,
    },
    /// Several maps were merged into a target context
    MapsMerged {
        user_id: String,
        source_contexts: Vec<String>,
        target_context: String,
        map_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Evolution surfaced emergent patterns
    PatternsDetected {
        user_id: String,
        context: String,
        map_id: String,
        kinds: Vec<PatternKind>,
        timestamp: DateTime<Utc>,
    },
    /// A knowledge expansion job finished before generation
    ExpansionCompleted {
        user_id: String,
        context: String,
        job_id: String,
        added_nodes: usize,
        added_edges: usize,
        timestamp: DateTime<Utc>,
    },
}

impl MindMapEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MapGenerated { timestamp, .. }
            | Self::MapEvolved { timestamp, .. }
            | Self::MapsMerged { timestamp, .. }
            | Self::PatternsDetected { timestamp, .. }
            | Self::ExpansionCompleted { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::MapGenerated { .. } => "map_generated",
            Self::MapEvolved { .. } => "map_evolved",
            Self::MapsMerged { .. } => "maps_merged",
            Self::PatternsDetected { .. } => "patterns_detected",
            Self::ExpansionCompleted { .. } => "expansion_completed",
        }
    }

    /// Context whose stored map the event concerns
    pub fn context(&self) -> &str {
        match self {
            Self::MapGenerated { context, .. }
            | Self::MapEvolved { context, .. }
            | Self::PatternsDetected { context, .. }
            | Self::ExpansionCompleted { context, .. } => context,
            Self::MapsMerged { target_context, .. } => target_context,
        }
    }

    pub fn map_generated(
        user_id: impl Into<String>,
        context: impl Into<String>,
        map_id: impl Into<String>,
        node_count: usize,
        connection_count: usize,
    ) -> Self {
        Self::MapGenerated {
            user_id: user_id.into(),
            context: context.into(),
            map_id: map_id.into(),
            node_count,
            connection_count,
            timestamp: Utc::now(),
        }
    }

    pub fn map_evolved(
        user_id: impl Into<String>,
        context: impl Into<String>,
        map_id: impl Into<String>,
        baseline_id: impl Into<String>,
        novelty: f32,
    ) -> Self {
        Self::MapEvolved {
            user_id: user_id.into(),
            context: context.into(),
            map_id: map_id.into(),
            baseline_id: baseline_id.into(),
            novelty,
            timestamp: Utc::now(),
        }
    }

    pub fn maps_merged(
        user_id: impl Into<String>,
        source_contexts: Vec<String>,
        target_context: impl Into<String>,
        map_id: impl Into<String>,
    ) -> Self {
        Self::MapsMerged {
            user_id: user_id.into(),
            source_contexts,
            target_context: target_context.into(),
            map_id: map_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn patterns_detected(
        user_id: impl Into<String>,
        context: impl Into<String>,
        map_id: impl Into<String>,
        kinds: Vec<PatternKind>,
    ) -> Self {
        Self::PatternsDetected {
            user_id: user_id.into(),
            context: context.into(),
            map_id: map_id.into(),
            kinds,
            timestamp: Utc::now(),
        }
    }

    pub fn expansion_completed(
        user_id: impl Into<String>,
        context: impl Into<String>,
        job_id: impl Into<String>,
        added_nodes: usize,
        added_edges: usize,
    ) -> Self {
        Self::ExpansionCompleted {
            user_id: user_id.into(),
            context: context.into(),
            job_id: job_id.into(),
            added_nodes,
            added_edges,
            timestamp: Utc::now(),
        }
    }
}
