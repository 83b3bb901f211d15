//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Neuromap configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub evolution: EvolutionConfig,
    pub merge: MergeConfig,
    pub expansion: ExpansionConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
}

/// Structure synthesis parameters, the defaults for every network model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding_dimension: usize,
    pub network_depth: usize,
    pub min_similarity_threshold: f32,
    pub enrich_similarity_edges: bool,
    pub max_enrichment_edges_per_node: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub creativity_factor: f32,
    /// Upper bound on new concepts per evolution, as a fraction of the baseline size
    pub max_growth_ratio: f32,
    pub prune_relevance_threshold: f32,
    pub max_links_per_new_concept: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Similarity above which nodes from different sources coalesce.
    /// Falls back to `engine.min_similarity_threshold` when unset.
    pub coalesce_threshold: Option<f32>,
    pub weight_policy: WeightPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub lock_timeout_ms: u64,
}

/// How weights of coalesced nodes and duplicate connections combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    #[default]
    Max,
    Sum,
}

impl WeightPolicy {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Max => a.max(b),
            Self::Sum => a + b,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Sum => "sum",
        }
    }
}

impl fmt::Display for WeightPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WeightPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            other => Err(anyhow!(
                "Invalid weight policy: {}. Valid options: max, sum",
                other
            )),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 64,
            network_depth: 3,
            min_similarity_threshold: 0.75,
            enrich_similarity_edges: true,
            max_enrichment_edges_per_node: 3,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            creativity_factor: 0.5,
            max_growth_ratio: 0.5,
            prune_relevance_threshold: 0.1,
            max_links_per_new_concept: 2,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            coalesce_threshold: None,
            weight_policy: WeightPolicy::Max,
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_ms: 250,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            ttl_secs: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 30_000,
        }
    }
}

impl ExpansionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl MergeConfig {
    /// Configured coalesce threshold, or `fallback` when none is set
    pub fn effective_threshold(&self, fallback: f32) -> f32 {
        self.coalesce_threshold.unwrap_or(fallback)
    }
}

const KEYS: &[&str] = &[
    "engine.embedding_dimension",
    "engine.network_depth",
    "engine.min_similarity_threshold",
    "engine.enrich_similarity_edges",
    "engine.max_enrichment_edges_per_node",
    "evolution.creativity_factor",
    "evolution.max_growth_ratio",
    "evolution.prune_relevance_threshold",
    "evolution.max_links_per_new_concept",
    "merge.coalesce_threshold",
    "merge.weight_policy",
    "expansion.timeout_secs",
    "expansion.poll_interval_ms",
    "cache.capacity",
    "cache.ttl_secs",
    "store.lock_timeout_ms",
];

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f32> {
    let parsed: f32 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}

fn parse_positive(key: &str, value: &str) -> anyhow::Result<usize> {
    let parsed: usize = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if parsed == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

fn display_optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "(not set)".to_string())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("NEUROMAP_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("neuromap")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.embedding_dimension == 0 {
            return Err(anyhow!("engine.embedding_dimension must be greater than zero"));
        }
        if self.engine.network_depth == 0 {
            return Err(anyhow!("engine.network_depth must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.engine.min_similarity_threshold) {
            return Err(anyhow!(
                "engine.min_similarity_threshold must be between 0.0 and 1.0"
            ));
        }
        if !(0.0..=1.0).contains(&self.evolution.creativity_factor) {
            return Err(anyhow!("evolution.creativity_factor must be between 0.0 and 1.0"));
        }
        if self.evolution.max_growth_ratio < 0.0 {
            return Err(anyhow!("evolution.max_growth_ratio must be non-negative"));
        }
        if let Some(threshold) = self.merge.coalesce_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(anyhow!("merge.coalesce_threshold must be between 0.0 and 1.0"));
            }
        }
        if self.cache.capacity == 0 {
            return Err(anyhow!("cache.capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "engine.embedding_dimension" => Ok(self.engine.embedding_dimension.to_string()),
            "engine.network_depth" => Ok(self.engine.network_depth.to_string()),
            "engine.min_similarity_threshold" => {
                Ok(self.engine.min_similarity_threshold.to_string())
            }
            "engine.enrich_similarity_edges" => Ok(self.engine.enrich_similarity_edges.to_string()),
            "engine.max_enrichment_edges_per_node" => {
                Ok(self.engine.max_enrichment_edges_per_node.to_string())
            }

            "evolution.creativity_factor" => Ok(self.evolution.creativity_factor.to_string()),
            "evolution.max_growth_ratio" => Ok(self.evolution.max_growth_ratio.to_string()),
            "evolution.prune_relevance_threshold" => {
                Ok(self.evolution.prune_relevance_threshold.to_string())
            }
            "evolution.max_links_per_new_concept" => {
                Ok(self.evolution.max_links_per_new_concept.to_string())
            }

            "merge.coalesce_threshold" => Ok(display_optional(&self.merge.coalesce_threshold)),
            "merge.weight_policy" => Ok(self.merge.weight_policy.to_string()),

            "expansion.timeout_secs" => Ok(self.expansion.timeout_secs.to_string()),
            "expansion.poll_interval_ms" => Ok(self.expansion.poll_interval_ms.to_string()),

            "cache.capacity" => Ok(self.cache.capacity.to_string()),
            "cache.ttl_secs" => Ok(display_optional(&self.cache.ttl_secs)),

            "store.lock_timeout_ms" => Ok(self.store.lock_timeout_ms.to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `neuromap config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "engine.embedding_dimension" => {
                self.engine.embedding_dimension = parse_positive(key, value)?;
            }
            "engine.network_depth" => {
                self.engine.network_depth = parse_positive(key, value)?;
            }
            "engine.min_similarity_threshold" => {
                self.engine.min_similarity_threshold = parse_unit(key, value)?;
            }
            "engine.enrich_similarity_edges" => {
                self.engine.enrich_similarity_edges = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }
            "engine.max_enrichment_edges_per_node" => {
                self.engine.max_enrichment_edges_per_node = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }

            "evolution.creativity_factor" => {
                self.evolution.creativity_factor = parse_unit(key, value)?;
            }
            "evolution.max_growth_ratio" => {
                let ratio: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
                if ratio < 0.0 {
                    return Err(anyhow!("{} must be non-negative", key));
                }
                self.evolution.max_growth_ratio = ratio;
            }
            "evolution.prune_relevance_threshold" => {
                self.evolution.prune_relevance_threshold = parse_unit(key, value)?;
            }
            "evolution.max_links_per_new_concept" => {
                self.evolution.max_links_per_new_concept = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }

            "merge.coalesce_threshold" => {
                self.merge.coalesce_threshold = match value {
                    "" | "none" => None,
                    v => Some(parse_unit(key, v)?),
                };
            }
            "merge.weight_policy" => {
                self.merge.weight_policy = value.parse()?;
            }

            "expansion.timeout_secs" => {
                self.expansion.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }
            "expansion.poll_interval_ms" => {
                self.expansion.poll_interval_ms = parse_positive(key, value)? as u64;
            }

            "cache.capacity" => {
                self.cache.capacity = parse_positive(key, value)?;
            }
            "cache.ttl_secs" => {
                self.cache.ttl_secs = match value {
                    "" | "none" => None,
                    v => Some(
                        v.parse()
                            .with_context(|| format!("Invalid {} value: {}", key, v))?,
                    ),
                };
            }

            "store.lock_timeout_ms" => {
                self.store.lock_timeout_ms = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key, value))?;
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `neuromap config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
