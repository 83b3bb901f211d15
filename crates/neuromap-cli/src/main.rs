//! Neuromap CLI - build, evolve and merge neural mind maps from concept graph files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use neuromap_core::config::Config;
use neuromap_core::domain::mindmap::RawGraph;
use neuromap_core::infrastructure::{
    ForceGraphAdapter, HashEmbeddingProvider, InMemoryGraphStore, StructuralInsightGenerator,
};
use neuromap_core::{EvolveOptions, GenerateOptions, MergeOptions, MindMapOutcome, NeuralMindMapEngine};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "neuromap")]
#[command(author, version, about = "Neural mind map engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a mind map from a concept graph file
    Generate {
        /// JSON file with `nodes` and `edges`
        #[arg(short, long)]
        graph: PathBuf,
        /// User the map belongs to
        #[arg(short, long, default_value = "local")]
        user: String,
        /// Context name (defaults to the file name without extension)
        #[arg(short, long)]
        context: Option<String>,
        /// Evolve the generated map this many times
        #[arg(long, default_value_t = 0)]
        evolve: usize,
        /// Creativity factor used for evolution (0.0 - 1.0)
        #[arg(long)]
        creativity: Option<f32>,
        /// Exact number of concepts each evolution adds
        #[arg(long)]
        new_concepts: Option<usize>,
        /// Include the visualization payload in JSON output
        #[arg(long)]
        visualize: bool,
    },

    /// Merge the maps of several concept graph files
    Merge {
        /// Graph files; each file's name is its context
        #[arg(short, long = "graph", required = true, num_args = 1..)]
        graphs: Vec<PathBuf>,
        /// User the maps belong to
        #[arg(short, long, default_value = "local")]
        user: String,
        /// Context that receives the merged map
        #[arg(short, long, default_value = "merged")]
        target: String,
        /// Similarity above which concepts from different maps coalesce
        #[arg(long)]
        threshold: Option<f32>,
        /// Include the visualization payload in JSON output
        #[arg(long)]
        visualize: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet { "neuromap=warn" } else { "neuromap=info" };
    let filter = tracing_subscriber::EnvFilter::builder()
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate {
            graph,
            user,
            context,
            evolve,
            creativity,
            new_concepts,
            visualize,
        } => {
            let context = match context {
                Some(context) => context,
                None => context_from_path(&graph)?,
            };
            let request = GenerateRequest {
                graph: &graph,
                user: &user,
                context: &context,
                evolve,
                creativity,
                new_concepts,
            };
            let outcome = cmd_generate(request).await?;
            print_outcome(&outcome, cli.format, cli.quiet, visualize)
        }

        Commands::Merge {
            graphs,
            user,
            target,
            threshold,
            visualize,
        } => {
            let outcome = cmd_merge(&graphs, &user, &target, threshold).await?;
            print_outcome(&outcome, cli.format, cli.quiet, visualize)
        }

        Commands::Config { action } => cmd_config(action, cli.format, cli.quiet),
    }
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<neuromap_core::Error>() {
        Some(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            if let Some(hint) = e.suggestion() {
                eprintln!("  Try: {}", hint);
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

/// Context name derived from a graph file's name
fn context_from_path(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Cannot derive a context name from '{}'", path.display()))
}

fn read_graph(path: &Path) -> anyhow::Result<RawGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file '{}'", path.display()))?;
    let graph: RawGraph = serde_json::from_str(&content)
        .with_context(|| format!("Invalid graph file '{}'", path.display()))?;
    debug!(
        path = %path.display(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Loaded concept graph"
    );
    Ok(graph)
}

fn build_engine(config: Config, graphs: Arc<InMemoryGraphStore>) -> anyhow::Result<NeuralMindMapEngine> {
    let provider = HashEmbeddingProvider::new(config.engine.embedding_dimension);
    let engine = NeuralMindMapEngine::builder(config)
        .embedding_provider(Arc::new(provider))
        .graph_store(graphs)
        .insight_generator(Arc::new(StructuralInsightGenerator::default()))
        .visualization_adapter(Arc::new(ForceGraphAdapter::default()))
        .build()?;
    Ok(engine)
}

struct GenerateRequest<'a> {
    graph: &'a Path,
    user: &'a str,
    context: &'a str,
    evolve: usize,
    creativity: Option<f32>,
    new_concepts: Option<usize>,
}

async fn cmd_generate(request: GenerateRequest<'_>) -> anyhow::Result<MindMapOutcome> {
    let config = Config::load()?;
    let creativity = request
        .creativity
        .unwrap_or(config.evolution.creativity_factor);

    let graphs = Arc::new(InMemoryGraphStore::new());
    graphs
        .insert_graph(request.user, request.context, read_graph(request.graph)?)
        .await;
    let engine = build_engine(config, graphs)?;

    let mut outcome = engine
        .generate(request.user, request.context, &GenerateOptions::default())
        .await?;

    let mut options = EvolveOptions::with_creativity(creativity);
    if let Some(count) = request.new_concepts {
        options = options.with_new_concepts(count);
    }
    for round in 1..=request.evolve {
        outcome = engine.evolve(request.user, request.context, &options).await?;
        info!(round, map_id = %outcome.structure.id, "Evolution round complete");
    }
    Ok(outcome)
}

async fn cmd_merge(
    paths: &[PathBuf],
    user: &str,
    target: &str,
    threshold: Option<f32>,
) -> anyhow::Result<MindMapOutcome> {
    let config = Config::load()?;
    let graphs = Arc::new(InMemoryGraphStore::new());

    let mut contexts = Vec::with_capacity(paths.len());
    for path in paths {
        let context = context_from_path(path)?;
        graphs.insert_graph(user, &context, read_graph(path)?).await;
        contexts.push(context);
    }

    let engine = build_engine(config, graphs)?;
    for context in &contexts {
        engine
            .generate(user, context, &GenerateOptions::default())
            .await?;
    }

    let options = MergeOptions {
        coalesce_threshold: threshold,
        ..MergeOptions::default()
    };
    Ok(engine.merge(user, &contexts, target, &options).await?)
}

fn print_outcome(
    outcome: &MindMapOutcome,
    format: OutputFormat,
    quiet: bool,
    visualize: bool,
) -> anyhow::Result<()> {
    let structure = &outcome.structure;

    if format == OutputFormat::Json {
        let mut payload = serde_json::json!({
            "map": structure.as_ref(),
            "insights": outcome.insights,
            "patterns": outcome.patterns,
            "patterns_degraded": outcome.patterns_degraded,
        });
        if visualize {
            payload["visualization"] = outcome.visualization.clone().unwrap_or_default();
        }
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if quiet {
        println!("{}", structure.id);
        return Ok(());
    }

    let metrics = &structure.cognitive_metrics;
    println!("Mind map {} (context '{}')", structure.id, structure.context);
    println!("  Concepts:    {}", metrics.node_count);
    println!("  Connections: {}", metrics.edge_count);
    println!("  Clusters:    {}", metrics.cluster_count);
    println!("  Layers:      {}", metrics.layer_count);
    println!("  Density:     {:.3}", metrics.knowledge_density);
    println!("  Complexity:  {:.3}", metrics.cognitive_complexity_score);

    if let Some(evolution) = &structure.evolution_metrics {
        println!(
            "  Evolution:   {} -> {} concepts, novelty {:.3}",
            evolution.original_size, evolution.new_size, evolution.novelty
        );
    }

    if let Some(report) = &outcome.build_report {
        if report.dropped_edges > 0 || !report.excluded_nodes.is_empty() {
            println!(
                "  Skipped:     {} dangling edges, {} concepts without embeddings",
                report.dropped_edges,
                report.excluded_nodes.len()
            );
        }
    }

    if !outcome.patterns.is_empty() {
        println!("\nEmergent patterns:");
        for pattern in &outcome.patterns {
            println!(
                "  - [{}] {} ({:.2})",
                pattern.kind.as_str(),
                pattern.description,
                pattern.confidence
            );
        }
    }

    if !outcome.insights.is_empty() {
        println!("\nInsights:");
        for insight in &outcome.insights {
            println!("  - [{}] {}", insight.insight_type.as_str(), insight.description);
        }
    }

    Ok(())
}

fn cmd_config(action: ConfigAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if format == OutputFormat::Json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in items {
                    println!("{} = {}", key, value);
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
