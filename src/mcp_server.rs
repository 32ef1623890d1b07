use crate::client::ChunkGraphClient;
use crate::types::*;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::{RequestContext, RoleServer},
    prompt, prompt_handler, prompt_router, tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct ChunkGraphMcpServer {
    client: Arc<ChunkGraphClient>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl ChunkGraphMcpServer {
    /// Create a server with the default configuration
    pub async fn new() -> Result<Self> {
        let client = ChunkGraphClient::new()
            .await
            .context("Failed to create chunkgraph client")?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a server around an existing client
    pub fn with_client(client: Arc<ChunkGraphClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    pub fn client(&self) -> &ChunkGraphClient {
        &self.client
    }
}

fn to_json<T: Serialize>(response: &T) -> Result<String, String> {
    serde_json::to_string_pretty(response).map_err(|e| format!("Serialization failed: {}", e))
}

#[tool_router(router = tool_router)]
impl ChunkGraphMcpServer {
    #[tool(
        description = "Register a TypeScript/JavaScript project. The path must be a directory inside a git working copy."
    )]
    async fn create_project(
        &self,
        Parameters(req): Parameters<CreateProjectRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .create_project(req)
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }

    #[tool(description = "List registered projects and the revision each was last analyzed at")]
    async fn list_projects(
        &self,
        Parameters(_req): Parameters<ListProjectsRequest>,
    ) -> Result<String, String> {
        let response = self
            .client
            .list_projects()
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }

    #[tool(
        description = "Extract symbol-level code chunks, embed them and rebuild the dependency graph. Only files changed since the last analyzed git revision are re-processed unless force_full is set."
    )]
    async fn analyze_project(
        &self,
        Parameters(req): Parameters<AnalyzeProjectRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .analyze_project(req)
            .await
            .map_err(|e| format!("{:#}", e))?; // Full error chain
        to_json(&response)
    }

    #[tool(description = "Delete a project and every chunk stored for it")]
    async fn delete_project(
        &self,
        Parameters(req): Parameters<DeleteProjectRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .delete_project(req)
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }

    #[tool(description = "Semantic similarity search over a project's code chunks")]
    async fn search_chunks(
        &self,
        Parameters(req): Parameters<SearchChunksRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .search_chunks(req)
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }

    #[tool(description = "BM25 keyword search over a project's chunk names and code")]
    async fn search_chunks_by_keyword(
        &self,
        Parameters(req): Parameters<KeywordSearchRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .search_keyword(req)
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }

    #[tool(
        description = "Show the dependencies, dependents and transitive dependencies of a named symbol"
    )]
    async fn chunk_dependencies(
        &self,
        Parameters(req): Parameters<ChunkDependenciesRequest>,
    ) -> Result<String, String> {
        req.validate()?;
        let response = self
            .client
            .chunk_dependencies(req)
            .await
            .map_err(|e| format!("{:#}", e))?;
        to_json(&response)
    }
}

// Prompts for slash commands
#[prompt_router]
impl ChunkGraphMcpServer {
    #[prompt(
        name = "analyze",
        description = "Analyze a registered project (incremental when git reports a previous revision)"
    )]
    async fn analyze_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<GetPromptResult, McpError> {
        let project = args.get("project").and_then(|v| v.as_str()).unwrap_or("");

        let messages = vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please analyze the project '{}'. Only files changed since the last analyzed revision will be re-processed.",
                project
            ),
        )];

        Ok(GetPromptResult {
            description: Some(format!("Analyze project {}", project)),
            messages,
        })
    }

    #[prompt(
        name = "search",
        description = "Search a project's code chunks by meaning"
    )]
    async fn search_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let project = args.get("project").and_then(|v| v.as_str()).unwrap_or("");
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Please search project '{}' for: {}", project, query),
        )])
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler]
impl ServerHandler for ChunkGraphMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "chunkgraph".into(),
                title: Some("chunkgraph - Code Chunks and Dependency Graph".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Symbol-level code chunk indexing for TypeScript/JavaScript projects. \
                Use create_project to register a git working copy, analyze_project to index it, \
                search_chunks or search_chunks_by_keyword to find code, \
                and chunk_dependencies to inspect the dependency graph."
                    .into(),
            ),
        }
    }
}

impl ChunkGraphMcpServer {
    /// Serve over stdio until the client disconnects
    pub async fn serve_stdio(client: Arc<ChunkGraphClient>) -> Result<()> {
        tracing::info!("Starting chunkgraph MCP server");

        let server = Self::with_client(client);

        let transport = rmcp::transport::io::stdio();

        server.serve(transport).await?.waiting().await?;

        Ok(())
    }
}
