//! Soapstone: command line client for a Pleroma-compatible server
//!
//! Subcommands:
//! - `bookmark-folders`: list, create, rename and delete bookmark folders
//! - `groups`: show, join, leave and moderate groups
//! - `statuses`: show and delete statuses

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soapstone_api::{ApiContext, ClientConfig, DEFAULT_USER_AGENT};

mod commands;

use commands::{BookmarkFolderCommand, GroupCommand, StatusCommand};

#[derive(Parser)]
#[command(name = "soapstone")]
#[command(about = "Client for the Soapstone entity cache", long_about = None)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServerArgs {
    /// Server URL
    #[arg(long, env = "SOAPSTONE_BASE_URL", default_value = "http://localhost:4000")]
    base_url: String,

    /// OAuth access token. Without one, mutations that need a session are skipped.
    #[arg(long, env = "SOAPSTONE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "SOAPSTONE_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Connect timeout in seconds
    #[arg(long, env = "SOAPSTONE_CONNECT_TIMEOUT_SECS", default_value = "10")]
    connect_timeout_secs: u64,

    #[arg(long, env = "SOAPSTONE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

impl ServerArgs {
    fn config(&self) -> ClientConfig {
        ClientConfig::builder()
            .base_url(self.base_url.as_str())
            .maybe_access_token(self.access_token.clone())
            .timeout_secs(self.timeout_secs)
            .connect_timeout_secs(self.connect_timeout_secs)
            .user_agent(self.user_agent.as_str())
            .build()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage bookmark folders
    #[command(subcommand)]
    BookmarkFolders(BookmarkFolderCommand),

    /// Inspect and manage groups
    #[command(subcommand)]
    Groups(GroupCommand),

    /// Inspect and delete statuses
    #[command(subcommand)]
    Statuses(StatusCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "soapstone=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = cli.server.config();
    let context = ApiContext::from_config(&config).map_err(|e| miette::miette!("{}", e))?;
    tracing::debug!(?config, "client configured");

    match cli.command {
        Commands::BookmarkFolders(command) => command.run(&context).await,
        Commands::Groups(command) => command.run(&context).await,
        Commands::Statuses(command) => command.run(&context).await,
    }
}
