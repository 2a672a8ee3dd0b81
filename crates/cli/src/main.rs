//! DeepDive CLI: the main entry point.
//!
//! Commands:
//! - `run`     Start a research workflow and wait for the report
//! - `status`  Show a stored research record
//! - `models`  List models offered by the configured provider
//! - `config`  Show, validate, or initialize configuration

use clap::{Parser, Subcommand, ValueEnum};
use deepdive_core::research::Depth;

mod commands;

#[derive(Parser)]
#[command(
    name = "deepdive",
    about = "DeepDive: multi-stage AI research pipeline",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DepthArg {
    Quick,
    Standard,
    Deep,
}

impl From<DepthArg> for Depth {
    fn from(arg: DepthArg) -> Self {
        match arg {
            DepthArg::Quick => Depth::Quick,
            DepthArg::Standard => Depth::Standard,
            DepthArg::Deep => Depth::Deep,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Research a query end to end
    Run {
        /// The research question (at least 5 characters)
        #[arg(short, long)]
        query: String,

        /// How many plan topics to research
        #[arg(short, long, value_enum, default_value = "standard")]
        depth: DepthArg,

        /// Print the final record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of a research workflow
    Status {
        /// Research id returned by `run`
        research_id: String,
    },

    /// List models offered by the configured provider
    Models,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { query, depth, json } => commands::run::run(query, depth.into(), json).await?,
        Commands::Status { research_id } => commands::status::run(&research_id).await?,
        Commands::Models => commands::models::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}
