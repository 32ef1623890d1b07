use anyhow::{Context, Result};
use chunkgraph::mcp_server::ChunkGraphMcpServer;
use chunkgraph::{
    AnalyzeProjectRequest, ChunkDependenciesRequest, ChunkGraphClient, Config,
    CreateProjectRequest, DeleteProjectRequest, KeywordSearchRequest, SearchChunksRequest,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "chunkgraph")]
#[command(about = "Symbol-level code chunk indexing and dependency graphs for TypeScript/JavaScript")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "CHUNKGRAPH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as MCP server over stdio
    Serve,

    /// Register a project rooted inside a git working copy
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// List registered projects
    List,

    /// Extract, embed and store a project's chunks
    Analyze {
        /// Project id or name
        project: String,
        /// Re-process every file even if the revision is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Delete a project and its chunks
    Delete {
        /// Project id or name
        project: String,
    },

    /// Semantic similarity search
    Search {
        project: String,
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// BM25 keyword search
    Keyword {
        project: String,
        keyword: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the dependency neighbourhood of a symbol
    Deps {
        project: String,
        symbol: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP transport and command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_path_with_env(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::new().context("Failed to load configuration")?,
    };
    let client = ChunkGraphClient::with_config(config).await?;

    match cli.command {
        Commands::Serve => ChunkGraphMcpServer::serve_stdio(Arc::new(client)).await?,
        Commands::Create {
            name,
            path,
            description,
        } => print_json(
            &client
                .create_project(CreateProjectRequest {
                    name,
                    path,
                    description,
                })
                .await?,
        )?,
        Commands::List => print_json(&client.list_projects().await?)?,
        Commands::Analyze { project, force } => print_json(
            &client
                .analyze_project(AnalyzeProjectRequest {
                    project,
                    force_full: force,
                })
                .await?,
        )?,
        Commands::Delete { project } => print_json(
            &client
                .delete_project(DeleteProjectRequest { project })
                .await?,
        )?,
        Commands::Search {
            project,
            query,
            limit,
            min_score,
        } => print_json(
            &client
                .search_chunks(SearchChunksRequest {
                    project,
                    query,
                    limit,
                    min_score,
                })
                .await?,
        )?,
        Commands::Keyword {
            project,
            keyword,
            limit,
        } => print_json(
            &client
                .search_keyword(KeywordSearchRequest {
                    project,
                    keyword,
                    limit,
                })
                .await?,
        )?,
        Commands::Deps { project, symbol } => print_json(
            &client
                .chunk_dependencies(ChunkDependenciesRequest {
                    project,
                    name: symbol,
                })
                .await?,
        )?,
    }

    Ok(())
}
