//! Hegelion MCP server binary: serves the dialectic engine over stdio.
//!
//! Logging goes to stderr; stdout carries the protocol.

use anyhow::Context;
use clap::Parser;
use hegelion_core::{create_backend, DialecticEngine, HegelionConfig};
use hegelion_mcp::transport::StdioTransport;
use hegelion_mcp::McpServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Hegelion MCP server: dialectical reasoning over the Model Context Protocol
#[derive(Parser, Debug)]
#[command(name = "hegelion-mcp", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./hegelion.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config =
        HegelionConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let backend = create_backend(&config.backend).context("failed to create backend")?;
    let engine = Arc::new(DialecticEngine::new(backend, &config));

    let mut server = McpServer::new(engine);
    let mut transport = StdioTransport::new();
    server
        .run(&mut transport)
        .await
        .context("MCP server failed")?;
    Ok(())
}
