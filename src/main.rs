use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memorypilot::cli;
use memorypilot::config::MemoryPilotConfig;
use memorypilot::memory::types::{MemoryType, Scope};

#[derive(Parser)]
#[command(
    name = "memorypilot",
    version,
    about = "Passive memory for developers, served to AI assistants over MCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create ~/.memorypilot, a default config and the database
    Init,
    /// Watch activity and extract memories until interrupted
    Daemon,
    /// Serve the MCP tools
    Mcp {
        /// Transport: stdio or http (defaults to the configured one)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Search stored memories
    Recall {
        /// Text to look for
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(long, short = 'n', default_value_t = 0)]
        limit: i64,
        /// Only this memory type
        #[arg(long = "type", short = 't')]
        memory_type: Option<MemoryType>,
        /// Only these scopes (repeatable)
        #[arg(long)]
        scope: Vec<Scope>,
        /// Rank by keyword match only, without embedding similarity
        #[arg(long)]
        no_semantic: bool,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a memory explicitly
    Remember {
        #[arg(required = true)]
        content: Vec<String>,
        #[arg(long = "type", short = 't', default_value = "fact")]
        memory_type: MemoryType,
        /// Comma-separated topic tags
        #[arg(long, default_value = "")]
        topics: String,
    },
    /// Show memory counts
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Run one importance-decay pass now
    Decay,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = MemoryPilotConfig::load()?;

    // stderr keeps stdout clean for MCP JSON-RPC.
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Init => cli::init::init(&config)?,
        Command::Daemon => memorypilot::agent::run_until_signal(&config).await?,
        Command::Mcp { transport } => {
            memorypilot::server::serve(config, transport.as_deref()).await?
        }
        Command::Recall {
            query,
            limit,
            memory_type,
            scope,
            no_semantic,
            json,
        } => {
            cli::recall::recall(
                config,
                cli::recall::RecallArgs {
                    query: query.join(" "),
                    limit,
                    memory_type,
                    scopes: scope,
                    no_semantic,
                    json,
                },
            )
            .await?
        }
        Command::Remember {
            content,
            memory_type,
            topics,
        } => {
            cli::remember::remember(config, content.join(" "), memory_type, cli::split_list(&topics))
                .await?
        }
        Command::Status { json } => cli::status::status(config, json).await?,
        Command::Decay => cli::maintenance::decay(&config)?,
    }

    Ok(())
}
