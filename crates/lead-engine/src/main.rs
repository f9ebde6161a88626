//! Leadflow command line

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use leadflow_engine::{LeadServer, LeadflowConfig};
use leadflow_infra_common::{log_welcome, setup_logging};

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Fair allocation of client service requests to agents", version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Create the database schema and exit
    Migrate,
    /// Allocate one open request and print the outcome
    Assign {
        request_id: String,
    },
    /// Create an approved, paid agent for local testing
    SeedAgent {
        #[arg(long)]
        external_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LeadflowConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    setup_logging(&config.logging).context("initializing logging")?;
    log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));

    // Every subcommand needs the store, and `new` applies the schema
    let server = LeadServer::new(config).await.context("opening record store")?;

    match cli.command {
        Command::Serve => server.run().await?,
        Command::Migrate => info!("Schema is up to date"),
        Command::Assign { request_id } => {
            let outcome = server.service().assign(&request_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::SeedAgent { external_id, name, email } => {
            let agent = server.seed_agent(&external_id, &name, &email).await?;
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
    }

    Ok(())
}
