//! Per-call options and results for engine operations

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::expansion::ExpansionOptions;
use crate::domain::mindmap::{
    BuildReport, EmergentPattern, FetchOptions, Insight, NeuralMapStructure,
};
use crate::domain::network::NetworkOverrides;

pub use crate::domain::mindmap::{EvolveOptions, MergeOptions};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Run a knowledge expansion job before fetching the graph
    pub expand_knowledge: bool,
    pub expansion: ExpansionOptions,
    /// Bound on the expansion wait; defaults to `expansion.timeout_secs`
    pub expansion_timeout: Option<Duration>,
    pub fetch: FetchOptions,
    pub network: Option<NetworkOverrides>,
    /// Aborts the operation before anything is committed
    pub cancel: Option<CancellationToken>,
}

impl GenerateOptions {
    pub fn with_expansion(mut self, expansion: ExpansionOptions) -> Self {
        self.expand_knowledge = true;
        self.expansion = expansion;
        self
    }

    pub fn with_expansion_timeout(mut self, timeout: Duration) -> Self {
        self.expansion_timeout = Some(timeout);
        self
    }

    pub fn with_network(mut self, network: NetworkOverrides) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Result of a generate, evolve or merge call
#[derive(Debug, Clone)]
pub struct MindMapOutcome {
    /// The committed structure, shared with the store
    pub structure: Arc<NeuralMapStructure>,
    pub insights: Vec<Insight>,
    pub visualization: Option<Value>,
    pub patterns: Vec<EmergentPattern>,
    /// Pattern detection failed during evolution
    pub patterns_degraded: bool,
    /// Only set by generate
    pub build_report: Option<BuildReport>,
}
