//! # markmap-mcp CLI
//!
//! Parses the command line, loads configuration, builds the optional clients
//! once and serves the MCP tools over stdio. Rendering and the publish policy
//! live in `markmap-core`; this module is wiring only.
//!
//! - [`Cli`]: user-facing flags.
//! - [`prepare`]: config + client construction, usable from tests.
//! - [`run`]: [`prepare`] followed by the stdio server loop.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use markmap_core::contract::{Expander, ObjectStore};
use rmcp::ServiceExt;

use crate::download::HttpFetcher;
use crate::load_config::load_config;
use crate::minio::MinioStore;
use crate::oss::OssStore;
use crate::qwen::QwenClient;
use crate::tools::{MarkmapServer, ToolContext};
use crate::viewer::SystemViewer;

/// MCP server that renders Markdown into interactive mind maps.
#[derive(Debug, Parser)]
#[clap(
    name = "markmap-mcp",
    version,
    about = "MCP server that turns text and Markdown into interactive mind maps and publishes them to object storage"
)]
pub struct Cli {
    /// Directory for generated HTML files (default: $MARKMAP_DIR or <tmp>/markmap)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Optional YAML file with non-secret settings
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Load configuration and build the tool context.
pub fn prepare(cli: Cli) -> Result<ToolContext> {
    tracing::info!("trace_initialised");

    let config = load_config(cli.output, cli.config.as_deref())?;
    let primary = config
        .oss
        .map(|c| Arc::new(OssStore::new(c)) as Arc<dyn ObjectStore>);
    let secondary = config
        .minio
        .map(|c| Arc::new(MinioStore::new(c)) as Arc<dyn ObjectStore>);
    let expander = config
        .qwen
        .map(|c| Arc::new(QwenClient::new(c)) as Arc<dyn Expander>);

    tracing::info!(
        output_dir = %config.output_dir.display(),
        oss = primary.is_some(),
        minio = secondary.is_some(),
        qwen = expander.is_some(),
        "Server configuration ready"
    );

    Ok(ToolContext {
        output_dir: config.output_dir,
        primary,
        secondary,
        expander,
        fetcher: Arc::new(HttpFetcher::new()),
        viewer: Arc::new(SystemViewer),
    })
}

/// Serve the tools on stdio until the client disconnects.
pub async fn run(cli: Cli) -> Result<()> {
    let context = prepare(cli)?;
    tracing::info!("Starting markmap MCP server on stdio");

    let server = MarkmapServer::new(context)
        .serve(rmcp::transport::stdio())
        .await?;
    server.waiting().await?;

    tracing::info!("markmap MCP server stopped");
    Ok(())
}
