//! Gmail MCP Reader
//!
//! A read-only Model Context Protocol (MCP) server for Gmail.
//! Searches messages, renders bodies as text, and previews attachments.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use gmail_mcp_reader::config::Config;
use gmail_mcp_reader::error::Result;
use gmail_mcp_reader::format::ExternalConverter;
use gmail_mcp_reader::gmail::auth::Authenticator;
use gmail_mcp_reader::gmail::client::GmailClient;
use gmail_mcp_reader::mcp::server::McpServer;
use gmail_mcp_reader::mcp::tools::ToolHandler;

/// Gmail MCP Reader
#[derive(Parser)]
#[command(name = "gmail-mcp-reader")]
#[command(author, version, about = "Gmail MCP Reader - a read-only Model Context Protocol server for Gmail")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with Gmail (run this first)
    Auth {
        /// Port for the local OAuth callback server
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::new()?;

    match cli.command {
        Some(Commands::Auth { port }) => {
            if let Some(port) = port {
                config.set_callback_port(port);
            }
            let authenticator = Authenticator::new(config).await?;
            authenticator.authenticate_interactive().await?;
        }
        None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    config.find_and_copy_oauth_keys()?;

    if !config.oauth_keys_exist() {
        eprintln!("Error: OAuth keys file not found.");
        eprintln!(
            "Please place gcp-oauth.keys.json in current directory or {}",
            config.config_dir.display()
        );
        std::process::exit(1);
    }

    let converter = Arc::new(ExternalConverter::new(config.converter.clone()));

    let authenticator = Authenticator::new(config).await?;

    if !authenticator.is_authenticated().await {
        eprintln!("Error: Not authenticated. Please run 'gmail-mcp-reader auth' first.");
        std::process::exit(1);
    }

    let gmail_client = Arc::new(GmailClient::new(Arc::new(authenticator)));

    tracing::info!("Starting Gmail MCP Reader on stdio");
    let mut server = McpServer::new(ToolHandler::new(gmail_client, converter));
    server.run_stdio().await?;

    Ok(())
}
