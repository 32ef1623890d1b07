//! # chunkgraph - Symbol-level Code Chunks and Dependency Graphs
//!
//! Indexes TypeScript/JavaScript repositories into symbol-level code chunks (functions,
//! classes, types, constants), embeds them for semantic search and keeps a
//! bidirectional dependency index between them. Re-indexing is incremental: only the
//! files git reports as changed since the last analyzed revision are re-processed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────┐
//! │ MCP client / CLI │─────▶│ChunkGraphMcp │  (7 tools, 2 prompts)
//! └──────────────────┘      │Server        │
//!                           └──────┬───────┘
//!                                  │
//!                         ┌────────▼────────┐
//!                         │ChunkGraphClient │──── ProjectRegistry (JSON)
//!                         └────────┬────────┘
//!        ┌──────────────┬──────────┼───────────┬───────────────┐
//!   ┌────▼────┐   ┌─────▼─────┐ ┌──▼───┐  ┌────▼─────┐  ┌──────▼──────┐
//!   │Change   │   │ChunkBuilder│ │graph │  │Embedding │  │ChunkStore   │
//!   │Detector │   │(tree-sitter│ │      │  │Requestor │  │(LanceDB +   │
//!   │(git2)   │   │ + rayon)   │ │      │  │(fastembed│  │ tantivy)    │
//!   └─────────┘   └───────────┘ └──────┘  └──────────┘  └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`indexer`]: file walking, symbol extraction, dependency analysis, chunk building
//! - [`graph`]: dependency reconciliation and transitive closure
//! - [`vcs`]: version-control access and change detection
//! - [`embedding`]: text preprocessing and batched embedding with retry
//! - [`store`]: chunk persistence and similarity/keyword search
//! - [`registry`]: persisted project list
//! - [`client`]: the operations every surface exposes
//! - [`mcp_server`]: rmcp tool server over stdio
//! - [`config`], [`error`], [`paths`], [`retry`], [`types`]: supporting plumbing
//!
//! ## Usage Example
//!
//! ```no_run
//! use chunkgraph::ChunkGraphClient;
//! use chunkgraph::mcp_server::ChunkGraphMcpServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChunkGraphClient::new().await?;
//!     ChunkGraphMcpServer::serve_stdio(Arc::new(client)).await
//! }
//! ```

/// Library client exposing every project operation
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation using FastEmbed
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Dependency graph reconciliation over chunk sets
pub mod graph;

/// File walking, symbol extraction and chunk building
pub mod indexer;

/// MCP server implementation with tools and prompts
pub mod mcp_server;

/// Platform data and config directories
pub mod paths;

/// Persisted project registry
pub mod registry;

/// Retry with exponential backoff
pub mod retry;

/// Chunk persistence backends
pub mod store;

/// Request/response types with JSON schema definitions
pub mod types;

/// Version control access and change detection
pub mod vcs;

#[cfg(test)]
mod test_support;

pub use client::ChunkGraphClient;
pub use config::Config;
pub use error::ChunkGraphError;
pub use types::*;
