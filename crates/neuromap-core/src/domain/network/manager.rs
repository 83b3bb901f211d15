//! Lazily built, shared cache of network models

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{ClusterCentroid, NetworkModel, NetworkOverrides, NetworkParams};
use crate::config::EngineConfig;
use crate::domain::mindmap::{MapKey, NeuralMapStructure};
use crate::error::Result;

/// Shared model cache, keyed by `(user, context)`
#[derive(Debug)]
pub struct NetworkModelManager {
    defaults: NetworkParams,
    models: RwLock<HashMap<MapKey, Arc<NetworkModel>>>,
    builds: AtomicU64,
}

impl NetworkModelManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            defaults: NetworkParams::from_config(config),
            models: RwLock::new(HashMap::new()),
            builds: AtomicU64::new(0),
        }
    }

    pub fn defaults(&self) -> NetworkParams {
        self.defaults
    }

    /// Return the cached model for `key`, building it on first use.
    ///
    /// Overrides that resolve to parameters different from the cached
    /// model's replace it with a freshly built one.
    pub async fn get_or_build(
        &self,
        key: &MapKey,
        overrides: Option<&NetworkOverrides>,
    ) -> Result<Arc<NetworkModel>> {
        let params = match overrides {
            Some(o) => self.defaults.with_overrides(o),
            None => self.defaults,
        };
        params.validate()?;

        {
            let models = self.models.read().await;
            if let Some(model) = models.get(key) {
                if model.params() == params {
                    return Ok(model.clone());
                }
            }
        }

        let mut models = self.models.write().await;
        if let Some(model) = models.get(key) {
            if model.params() == params {
                return Ok(model.clone());
            }
            debug!(key = %key, "Network parameters changed, rebuilding model");
        }

        let model = Arc::new(self.build(key, params));
        models.insert(key.clone(), model.clone());
        Ok(model)
    }

    fn build(&self, key: &MapKey, params: NetworkParams) -> NetworkModel {
        self.builds.fetch_add(1, Ordering::Relaxed);
        info!(
            key = %key,
            embedding_dimension = params.embedding_dimension,
            network_depth = params.network_depth,
            "Built network model"
        );
        NetworkModel {
            user_id: key.user_id.clone(),
            context: key.context.clone(),
            embedding_dimension: params.embedding_dimension,
            network_depth: params.network_depth,
            min_similarity_threshold: params.min_similarity_threshold,
            centroids: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Record the cluster centroids of a committed structure
    pub async fn learn_centroids(&self, key: &MapKey, structure: &NeuralMapStructure) {
        let mut models = self.models.write().await;
        if let Some(model) = models.get_mut(key) {
            let mut updated = (**model).clone();
            updated.centroids = structure
                .clusters
                .iter()
                .map(|c| ClusterCentroid {
                    cluster_id: c.id.clone(),
                    centroid: c.centroid.clone(),
                })
                .collect();
            *model = Arc::new(updated);
        }
    }

    pub async fn get(&self, key: &MapKey) -> Option<Arc<NetworkModel>> {
        self.models.read().await.get(key).cloned()
    }

    pub async fn invalidate(&self, key: &MapKey) -> bool {
        self.models.write().await.remove(key).is_some()
    }

    pub async fn invalidate_all(&self) {
        self.models.write().await.clear();
    }

    /// Number of models built since creation
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}
