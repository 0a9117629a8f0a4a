//! Knowledge graph CLI - main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use knowledge_graph::commands::{self, OutputFormat};
use knowledge_graph::{metrics, Chunker, Config, KnowledgeGraphBuilder};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "Build and query a document knowledge graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Path to config.yml (defaults to ./config.yml, then ../config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory graph store instead of Neo4j
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    /// Output format: table or json
    #[arg(short, long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk files and ingest them, one document per file
    Build {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// File extensions picked up while walking directories
        #[arg(short, long, value_delimiter = ',', default_value = "md,txt,rst")]
        extensions: Vec<String>,

        /// Words per chunk (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Words shared between neighbouring chunks (overrides config)
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Print entities and relationships found in a file or inline text
    Extract {
        /// File to read; use --text for inline input
        file: Option<PathBuf>,

        /// Inline text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,
    },

    /// Node and relationship counts
    Stats,

    /// Entity type histogram and most mentioned entities
    Metrics,

    /// Search entities and relationships by name
    Search {
        query: String,

        /// Comma separated entity types (e.g. person,organization)
        #[arg(short, long)]
        types: Option<String>,
    },

    /// Summary of one entity and its neighbourhood
    Context {
        entity_id: String,

        #[arg(short, long, default_value = "2")]
        depth: usize,
    },

    /// Nodes reachable from an entity
    Neighbors {
        entity_id: String,

        /// Only follow this relationship type (e.g. co_occurs)
        #[arg(short, long)]
        relation: Option<String>,

        #[arg(short, long, default_value = "1")]
        depth: usize,
    },

    /// Paths between two nodes
    Paths {
        source_id: String,
        target_id: String,

        #[arg(short, long, default_value = "3")]
        max_length: usize,
    },

    /// Entities ranked by number of connections
    Clusters {
        #[arg(short, long, default_value = "2")]
        min_connections: usize,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run a JSON graph query, e.g. '{"kind":"entities","entity_type":"PERSON","limit":10}'
    Query { query: String },

    /// Create constraints and indexes
    InitSchema,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Extract { .. } => "extract",
            Commands::Stats => "stats",
            Commands::Metrics => "metrics",
            Commands::Search { .. } => "search",
            Commands::Context { .. } => "context",
            Commands::Neighbors { .. } => "neighbors",
            Commands::Paths { .. } => "paths",
            Commands::Clusters { .. } => "clusters",
            Commands::Query { .. } => "query",
            Commands::InitSchema => "init_schema",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("knowledge_graph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::new(),
    };
    if cli.offline {
        config.offline_mode = true;
    }
    let format = OutputFormat::parse(&cli.format);

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command, &config, format).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(
    command: Commands,
    config: &Config,
    format: OutputFormat,
) -> anyhow::Result<()> {
    // Extraction needs no store
    if let Commands::Extract { file, text } = &command {
        let input = match (file, text) {
            (Some(path), _) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, Some(text)) => text.clone(),
            (None, None) => anyhow::bail!("Provide a file or --text"),
        };
        let report = commands::extract_run(&input);
        return commands::extract::print_report(&report, format);
    }

    let mut builder = KnowledgeGraphBuilder::connect(config)
        .await
        .context("Failed to connect to the graph store")?;

    match command {
        Commands::Build {
            paths,
            extensions,
            chunk_size,
            chunk_overlap,
        } => {
            let chunker = Chunker::new(
                chunk_size.unwrap_or(config.chunking.chunk_size),
                chunk_overlap.unwrap_or(config.chunking.chunk_overlap),
            );
            let args = commands::BuildArgs {
                paths,
                extensions,
                chunker,
            };
            let summary = commands::build_run(&mut builder, &args).await?;
            commands::build::print_summary(&summary, format)?;
        }
        Commands::Extract { .. } => {}
        Commands::Stats => {
            commands::query::stats(&builder, format).await?;
        }
        Commands::Metrics => {
            commands::query::metrics_report(&builder, format).await?;
        }
        Commands::Search { query, types } => {
            commands::query::search(&builder, &query, types.as_deref(), format).await?;
        }
        Commands::Context { entity_id, depth } => {
            commands::query::context(&builder, &entity_id, depth, format).await?;
        }
        Commands::Neighbors {
            entity_id,
            relation,
            depth,
        } => {
            commands::query::neighbors(&builder, &entity_id, relation.as_deref(), depth, format)
                .await?;
        }
        Commands::Paths {
            source_id,
            target_id,
            max_length,
        } => {
            commands::query::paths(&builder, &source_id, &target_id, max_length, format).await?;
        }
        Commands::Clusters {
            min_connections,
            limit,
        } => {
            commands::query::clusters(&builder, min_connections, limit, format).await?;
        }
        Commands::Query { query } => {
            commands::query::typed_query(&builder, &query, format).await?;
        }
        Commands::InitSchema => {
            builder.init_schema().await?;
            println!("Schema initialized ({})", builder.store().backend_name());
        }
    }

    Ok(())
}
