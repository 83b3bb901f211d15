//! Neural mind map engine
//!
//! Orchestrates embedding, structure building, evolution and merge over a
//! shared store. Every write operation holds the target key's lock for its
//! whole duration and commits as its last fallible step, so failures and
//! cancellation leave earlier state untouched.
//!
//! ```ignore
//! let engine = NeuralMindMapEngine::builder(Config::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .graph_store(graphs.clone())
//!     .build()?;
//!
//! let outcome = engine.generate("user123", "research", &GenerateOptions::default()).await?;
//! let evolved = engine.evolve("user123", "research", &EvolveOptions::with_creativity(0.8)).await?;
//! ```

mod options;

pub use options::{EvolveOptions, GenerateOptions, MergeOptions, MindMapOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::embedding::{EmbeddingCache, EmbeddingProvider};
use crate::domain::expansion::{ExpansionCoordinator, ExpansionJobSystem};
use crate::domain::mindmap::{
    BuildSettings, EmergentPattern, EvolutionEngine, EvolutionSettings, GraphStore, Insight,
    InsightGenerator, MapKey, MapStructureBuilder, MergeEngine, MergeSource, MindMapEvent,
    NeuralMapStructure, RawGraph, Similarity, VisualizationAdapter, distinct_sources,
};
use crate::domain::network::{NetworkModel, NetworkModelManager, NetworkOverrides};
use crate::domain::store::ConceptMapStore;
use crate::error::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct NeuralMindMapEngine {
    config: Config,
    embeddings: Arc<dyn EmbeddingProvider>,
    graphs: Arc<dyn GraphStore>,
    expansion: Option<ExpansionCoordinator>,
    insights: Option<Arc<dyn InsightGenerator>>,
    visualizer: Option<Arc<dyn VisualizationAdapter>>,
    cache: EmbeddingCache,
    models: NetworkModelManager,
    store: ConceptMapStore,
    builder: MapStructureBuilder,
    evolution: EvolutionEngine,
    merger: MergeEngine,
    events: broadcast::Sender<MindMapEvent>,
}

impl std::fmt::Debug for NeuralMindMapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeuralMindMapEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("expansion", &self.expansion)
            .finish_non_exhaustive()
    }
}

/// Builder for [`NeuralMindMapEngine`]
pub struct NeuralMindMapEngineBuilder {
    config: Config,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    graphs: Option<Arc<dyn GraphStore>>,
    jobs: Option<Arc<dyn ExpansionJobSystem>>,
    insights: Option<Arc<dyn InsightGenerator>>,
    visualizer: Option<Arc<dyn VisualizationAdapter>>,
}

impl NeuralMindMapEngineBuilder {
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(provider);
        self
    }

    pub fn graph_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.graphs = Some(store);
        self
    }

    pub fn expansion_jobs(mut self, jobs: Arc<dyn ExpansionJobSystem>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn insight_generator(mut self, generator: Arc<dyn InsightGenerator>) -> Self {
        self.insights = Some(generator);
        self
    }

    pub fn visualization_adapter(mut self, adapter: Arc<dyn VisualizationAdapter>) -> Self {
        self.visualizer = Some(adapter);
        self
    }

    pub fn build(self) -> Result<NeuralMindMapEngine> {
        self.config
            .validate()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        let embeddings = self
            .embeddings
            .ok_or_else(|| Error::validation("an embedding provider is required"))?;
        let graphs = self
            .graphs
            .ok_or_else(|| Error::validation("a graph store is required"))?;

        let config = self.config;
        let provider = embeddings.clone();
        let builder = MapStructureBuilder::new(BuildSettings::from(&config.engine))
            .with_similarity(Similarity::new(move |a, b| provider.similarity(a, b)));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(NeuralMindMapEngine {
            expansion: self
                .jobs
                .map(|jobs| ExpansionCoordinator::new(jobs, &config.expansion)),
            insights: self.insights,
            visualizer: self.visualizer,
            cache: EmbeddingCache::from_config(&config.cache),
            models: NetworkModelManager::new(&config.engine),
            store: ConceptMapStore::new(&config.store),
            evolution: EvolutionEngine::new(
                EvolutionSettings::from(&config.evolution),
                builder.clone(),
            ),
            merger: MergeEngine::new(config.merge.clone(), builder.clone()),
            builder,
            embeddings,
            graphs,
            events,
            config,
        })
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn check_cancelled(cancel: &CancellationToken, context: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled(format!(
            "generation for context '{}'",
            context
        )));
    }
    Ok(())
}

impl NeuralMindMapEngine {
    pub fn builder(config: Config) -> NeuralMindMapEngineBuilder {
        NeuralMindMapEngineBuilder {
            config,
            embeddings: None,
            graphs: None,
            jobs: None,
            insights: None,
            visualizer: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn network_models(&self) -> &NetworkModelManager {
        &self.models
    }

    pub fn store(&self) -> &ConceptMapStore {
        &self.store
    }

    /// Receive events for every committed change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MindMapEvent> {
        self.events.subscribe()
    }

    pub async fn get(&self, user_id: &str, context: &str) -> Option<Arc<NeuralMapStructure>> {
        self.store.get(&MapKey::new(user_id, context)).await
    }

    pub async fn contexts(&self, user_id: &str) -> Vec<String> {
        self.store.contexts(user_id).await
    }

    /// Build a map for `context` from the stored concept graph and replace
    /// whatever map the context held
    pub async fn generate(
        &self,
        user_id: &str,
        context: &str,
        options: &GenerateOptions,
    ) -> Result<MindMapOutcome> {
        require("user id", user_id)?;
        require("context", context)?;
        let key = MapKey::new(user_id, context);
        let cancel = options.cancel.clone().unwrap_or_default();

        info!(user_id = %user_id, context = %context, "Generating neural mind map");
        let guard = self.store.lock(&key).await?;

        if options.expand_knowledge {
            let coordinator = self.expansion.as_ref().ok_or_else(|| {
                Error::validation("knowledge expansion requested but no expansion job system is configured")
            })?;
            check_cancelled(&cancel, context)?;
            let job_id = coordinator
                .expand(user_id, context, &options.expansion)
                .await?;
            let wait = options
                .expansion_timeout
                .unwrap_or_else(|| coordinator.default_timeout());
            let result = coordinator
                .await_completion(context, &job_id, wait, &cancel)
                .await?;
            self.emit(MindMapEvent::expansion_completed(
                user_id,
                context,
                job_id.as_str(),
                result.added_nodes,
                result.added_edges,
            ));
        }

        let model = self
            .models
            .get_or_build(&key, options.network.as_ref())
            .await?;
        self.check_provider_dimension(&model)?;

        let raw = self.graphs.fetch_graph(user_id, context, &options.fetch).await?;
        let embeddings = self.embed_graph(&raw).await?;
        let (structure, report) = self.builder.build(&raw, &embeddings, &model)?;
        if !report.excluded_nodes.is_empty() {
            warn!(
                context = %context,
                excluded = report.excluded_nodes.len(),
                "Some concepts had no usable embedding and were left out"
            );
        }

        check_cancelled(&cancel, context)?;
        let stored = self.store.commit(&guard, structure).await?;
        drop(guard);

        self.models.learn_centroids(&key, &stored).await;
        self.emit(MindMapEvent::map_generated(
            user_id,
            context,
            stored.id.as_str(),
            stored.nodes.len(),
            stored.connections.len(),
        ));
        info!(
            user_id = %user_id,
            context = %context,
            map_id = %stored.id,
            nodes = stored.nodes.len(),
            clusters = stored.clusters.len(),
            "Neural mind map generated"
        );

        let (insights, visualization) = self.describe(&stored, &[]).await;
        Ok(MindMapOutcome {
            structure: stored,
            insights,
            visualization,
            patterns: Vec::new(),
            patterns_degraded: false,
            build_report: Some(report),
        })
    }

    /// Evolve the map stored for `context` and replace it with the result
    pub async fn evolve(
        &self,
        user_id: &str,
        context: &str,
        options: &EvolveOptions,
    ) -> Result<MindMapOutcome> {
        require("user id", user_id)?;
        require("context", context)?;
        let key = MapKey::new(user_id, context);

        let guard = self.store.lock(&key).await?;
        let baseline = self.store.get(&key).await.ok_or_else(|| {
            Error::not_found(format!(
                "No existing neural mind map found for context '{}'",
                context
            ))
        })?;

        info!(
            user_id = %user_id,
            context = %context,
            creativity = options.creativity_factor,
            "Evolving neural mind map"
        );

        let model = self.model_for(&key, &baseline).await?;
        let outcome = self.evolution.evolve(&baseline, &model, options)?;
        let stored = self.store.commit(&guard, outcome.structure).await?;
        drop(guard);

        self.models.learn_centroids(&key, &stored).await;
        let novelty = stored
            .evolution_metrics
            .as_ref()
            .map(|m| m.novelty)
            .unwrap_or_default();
        self.emit(MindMapEvent::map_evolved(
            user_id,
            context,
            stored.id.as_str(),
            baseline.id.as_str(),
            novelty,
        ));
        if !outcome.patterns.is_empty() {
            self.emit(MindMapEvent::patterns_detected(
                user_id,
                context,
                stored.id.as_str(),
                outcome.patterns.iter().map(|p| p.kind).collect(),
            ));
        }
        info!(
            user_id = %user_id,
            context = %context,
            map_id = %stored.id,
            nodes = stored.nodes.len(),
            novelty,
            patterns = outcome.patterns.len(),
            "Neural mind map evolved"
        );

        let (insights, visualization) = self.describe(&stored, &outcome.patterns).await;
        Ok(MindMapOutcome {
            structure: stored,
            insights,
            visualization,
            patterns: outcome.patterns,
            patterns_degraded: outcome.patterns_degraded,
            build_report: None,
        })
    }

    /// Merge the maps of `source_contexts` into `target_context`; sources
    /// are left as they are
    pub async fn merge(
        &self,
        user_id: &str,
        source_contexts: &[String],
        target_context: &str,
        options: &MergeOptions,
    ) -> Result<MindMapOutcome> {
        let sources = distinct_sources(source_contexts)?;
        require("user id", user_id)?;
        require("target context", target_context)?;
        if sources.iter().any(|context| context == target_context) {
            return Err(Error::validation(format!(
                "Target context '{}' cannot also be a merge source",
                target_context
            )));
        }

        let target = MapKey::new(user_id, target_context);
        let guard = self.store.lock(&target).await?;

        let mut loaded: Vec<(String, Arc<NeuralMapStructure>)> = Vec::with_capacity(sources.len());
        for context in sources {
            let structure = self
                .store
                .get(&MapKey::new(user_id, &context))
                .await
                .ok_or_else(|| {
                    Error::not_found(format!("Mind map not found for context '{}'", context))
                })?;
            loaded.push((context, structure));
        }

        info!(
            user_id = %user_id,
            sources = ?loaded.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>(),
            target = %target_context,
            "Merging neural mind maps"
        );

        let mut network = options.network.clone().unwrap_or_default();
        if network.embedding_dimension.is_none() {
            network.embedding_dimension = loaded.first().map(|(_, s)| s.embedding_dimension);
        }
        let model = self.models.get_or_build(&target, Some(&network)).await?;

        let merge_sources: Vec<MergeSource<'_>> = loaded
            .iter()
            .map(|(context, structure)| MergeSource {
                context: context.as_str(),
                structure: structure.as_ref(),
            })
            .collect();
        let structure = self.merger.merge(&merge_sources, &model, options)?;
        let stored = self.store.commit(&guard, structure).await?;
        drop(guard);

        self.models.learn_centroids(&target, &stored).await;
        let source_names: Vec<String> = loaded.into_iter().map(|(c, _)| c).collect();
        self.emit(MindMapEvent::maps_merged(
            user_id,
            source_names,
            target_context,
            stored.id.as_str(),
        ));
        info!(
            user_id = %user_id,
            target = %target_context,
            map_id = %stored.id,
            nodes = stored.nodes.len(),
            "Neural mind maps merged"
        );

        let (insights, visualization) = self.describe(&stored, &[]).await;
        Ok(MindMapOutcome {
            structure: stored,
            insights,
            visualization,
            patterns: Vec::new(),
            patterns_degraded: false,
            build_report: None,
        })
    }

    /// Model matching a stored map's shape, reusing the cached one when it fits
    async fn model_for(
        &self,
        key: &MapKey,
        structure: &NeuralMapStructure,
    ) -> Result<Arc<NetworkModel>> {
        if let Some(model) = self.models.get(key).await {
            if model.embedding_dimension == structure.embedding_dimension
                && model.network_depth == structure.network_depth
            {
                return Ok(model);
            }
        }
        let overrides = NetworkOverrides {
            embedding_dimension: Some(structure.embedding_dimension),
            network_depth: Some(structure.network_depth),
            min_similarity_threshold: None,
        };
        self.models.get_or_build(key, Some(&overrides)).await
    }

    fn check_provider_dimension(&self, model: &NetworkModel) -> Result<()> {
        let provided = self.embeddings.dimension();
        if provided != model.embedding_dimension {
            return Err(Error::validation(format!(
                "embedding provider produces {}-dimensional vectors but the network model for '{}' expects {}",
                provided, model.context, model.embedding_dimension
            )));
        }
        Ok(())
    }

    /// Embed every distinct label through the cache, keyed by node id.
    /// Labels missing from the cache go to the provider in one request.
    async fn embed_graph(&self, raw: &RawGraph) -> Result<HashMap<String, Vec<f32>>> {
        let mut labels: Vec<String> = raw.nodes.iter().map(|n| n.label.clone()).collect();
        labels.sort_unstable();
        labels.dedup();

        let vectors = self
            .cache
            .get_or_compute(&labels, |batch| self.embed_batch(batch))
            .await?;
        let by_label: HashMap<&str, Vec<f32>> =
            labels.iter().map(String::as_str).zip(vectors).collect();

        debug!(
            nodes = raw.nodes.len(),
            labels = by_label.len(),
            cache_entries = self.cache.len(),
            "Embedded concept labels"
        );

        Ok(raw
            .nodes
            .iter()
            .filter_map(|n| by_label.get(n.label.as_str()).map(|v| (n.id.clone(), v.clone())))
            .collect())
    }

    async fn embed_batch(&self, labels: Vec<String>) -> Result<Vec<Vec<f32>>> {
        debug!(labels = labels.len(), "Requesting embeddings");
        let vectors = self.embeddings.embed(&labels).await.map_err(|e| match e {
            Error::Upstream(_) => e,
            other => Error::upstream(format!("Embedding provider failed: {}", other)),
        })?;
        if vectors.len() != labels.len() {
            return Err(Error::upstream(format!(
                "Embedding provider returned {} vectors for {} labels",
                vectors.len(),
                labels.len()
            )));
        }
        Ok(vectors)
    }

    /// Run the insight and visualization collaborators; failures only warn
    async fn describe(
        &self,
        structure: &NeuralMapStructure,
        patterns: &[EmergentPattern],
    ) -> (Vec<Insight>, Option<Value>) {
        let insights = match &self.insights {
            Some(generator) => match generator.generate_insights(structure, patterns).await {
                Ok(insights) => insights,
                Err(e) => {
                    warn!(map_id = %structure.id, error = %e, "Insight generation failed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let visualization = match &self.visualizer {
            Some(adapter) => match adapter.render(structure).await {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(map_id = %structure.id, error = %e, "Visualization rendering failed");
                    None
                }
            },
            None => None,
        };

        (insights, visualization)
    }

    fn emit(&self, event: MindMapEvent) {
        debug!(event_type = event.event_type_name(), context = %event.context(), "Publishing event");
        // No receivers is not an error
        let _ = self.events.send(event);
    }
}
