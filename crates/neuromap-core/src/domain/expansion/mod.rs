//! Knowledge graph expansion
//!
//! Before generating a map the engine may ask an external job system to
//! grow the stored concept graph. Jobs are asynchronous: the coordinator
//! submits one and polls it until it finishes, the wait is bounded by a
//! timeout, and a cancellation token aborts the wait early.

mod coordinator;

pub use coordinator::ExpansionCoordinator;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifier issued by the job system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { result: ExpansionResult },
    Failed { message: String },
}

/// What the job system should expand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionOptions {
    /// Hops to follow out from existing concepts
    pub depth: usize,
    pub max_new_concepts: usize,
    /// Restrict expansion to these seed concept ids; empty means all
    pub seed_concepts: Vec<String>,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            max_new_concepts: 50,
            seed_concepts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResult {
    pub added_nodes: usize,
    pub added_edges: usize,
}

/// External system that runs expansion jobs
#[async_trait]
pub trait ExpansionJobSystem: Send + Sync {
    async fn submit_expansion(
        &self,
        user_id: &str,
        context: &str,
        options: &ExpansionOptions,
    ) -> Result<JobId>;

    async fn poll_job(&self, job_id: &JobId) -> Result<JobStatus>;
}
