use anyhow::Result;
use caldav_mcp::client::CaldavClient;
use caldav_mcp::config::Config;
use caldav_mcp::server::CaldavMcpServer;
use caldav_mcp::{cli, install};
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caldav-mcp", version, about = "CalDAV bridge for MCP hosts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdin/stdout
    Serve,
    /// Register the server with the Claude desktop application
    Install,
    /// List calendars through a spawned server instance
    Calendars,
    /// List the events of one calendar through a spawned server instance
    Events {
        /// Calendar href or display name, as printed by `calendars`
        #[arg(long)]
        calendar_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP wire; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("caldav_mcp=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Install => {
            let path = install::install()?;
            println!("Registered '{}' in {}", install::SERVER_NAME, path.display());
            println!("Restart the desktop application to pick up the new server.");
            Ok(())
        }
        Command::Calendars => cli::calendars().await,
        Command::Events { calendar_id } => cli::events(&calendar_id).await,
    }
}

async fn serve() -> Result<()> {
    let config = Config::load()?;
    let client = CaldavClient::new(&config)?;

    // Fail fast on unreachable servers or bad credentials.
    client.connect().await?;
    info!(url = %config.url, "connected to CalDAV server");

    let service = CaldavMcpServer::new(client).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
