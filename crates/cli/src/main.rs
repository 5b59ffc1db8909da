//! # nl2sql: ask BigQuery questions in natural language
//!
//! This is the entry point for the `nl2sql` command-line interface. It loads
//! the configuration, resolves the cloud project, bootstraps the agent and
//! then answers a single question or runs an interactive loop.

mod engines;
mod repl;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nl2sql::{
    auth::{AdcTokenSource, StaticTokenSource, TokenSource},
    config::load_config,
    engine::AgentEngineClient,
    gcloud::DEFAULT_GCLOUD_PROGRAM,
    AppConfig, Nl2SqlAgent, ProjectResolver, RuntimeIdentity,
};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask questions about BigQuery data in natural language", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, global = true, env = "NL2SQL_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// The gcloud executable used to look up the active project
    #[arg(long, global = true, env = "NL2SQL_GCLOUD", default_value = DEFAULT_GCLOUD_PROGRAM)]
    gcloud: String,

    /// Use this OAuth access token instead of application default credentials
    #[arg(long, global = true, env = "NL2SQL_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Ask a single question and exit; takes precedence over --interactive
    #[arg(long, short)]
    question: Option<String>,

    /// Run the interactive question loop (the default without --question)
    #[arg(long, short)]
    interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work with agents deployed on Vertex AI Agent Engine
    #[command(subcommand)]
    Engines(EngineCommands),
}

#[derive(Subcommand, Debug)]
enum EngineCommands {
    /// List the deployed agents in the project and location
    List,
    /// Show one deployed agent
    Get {
        /// Full resource name: projects/{p}/locations/{l}/reasoningEngines/{id}
        resource: String,
    },
    /// List a user's sessions on a deployed agent
    Sessions {
        /// Full resource name: projects/{p}/locations/{l}/reasoningEngines/{id}
        resource: String,
        #[arg(long, default_value = "user_1")]
        user_id: String,
    },
    /// Send a question to a deployed agent
    Query {
        /// Full resource name: projects/{p}/locations/{l}/reasoningEngines/{id}
        resource: String,
        #[arg(long, short)]
        question: String,
        #[arg(long, default_value = "user_1")]
        user_id: String,
    },
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    debug!(config = ?cli.config, gcloud = %cli.gcloud, "Parsed arguments");

    match &cli.command {
        Some(Commands::Engines(command)) => run_engines(&cli, command).await,
        None => run_agent(&cli).await,
    }
}

fn token_source(cli: &Cli) -> Box<dyn TokenSource> {
    match &cli.access_token {
        Some(token) => Box::new(StaticTokenSource::new(token.clone())),
        None => Box::new(AdcTokenSource::new()),
    }
}

/// Resolves the project and exports it for child processes.
async fn resolve_identity(cli: &Cli, config: Option<&AppConfig>) -> Result<RuntimeIdentity> {
    let resolver = ProjectResolver::standard(config, &cli.gcloud);
    let identity = RuntimeIdentity::resolve(config, &resolver).await?;
    identity.export_to_env();
    ui::print_identity(&identity);
    Ok(identity)
}

async fn run_agent(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let identity = resolve_identity(cli, Some(&config)).await?;

    let agent = Nl2SqlAgent::bootstrap(&config, &identity, token_source(cli)).await?;
    ui::print_agent(&agent);

    if cli.question.is_some() && cli.interactive {
        info!("Both --question and --interactive given; answering the single question.");
    }
    match &cli.question {
        Some(question) => {
            ui::print_question(question);
            let response = agent.answer(question).await?;
            ui::print_response(&response);
            Ok(())
        }
        _ => repl::run(&agent).await,
    }
}

async fn run_engines(cli: &Cli, command: &EngineCommands) -> Result<()> {
    // The configuration is optional here; the project can come from gcloud or the environment.
    let config = if cli.config.exists() {
        Some(load_config(&cli.config)?)
    } else {
        info!("No configuration file at '{}'.", cli.config.display());
        None
    };
    let identity = resolve_identity(cli, config.as_ref()).await?;
    let client = AgentEngineClient::new(&identity, None, token_source(cli))?;

    match command {
        EngineCommands::List => engines::list(&client).await,
        EngineCommands::Get { resource } => engines::get(&client, resource).await,
        EngineCommands::Sessions { resource, user_id } => {
            engines::sessions(&client, resource, user_id).await
        }
        EngineCommands::Query {
            resource,
            question,
            user_id,
        } => engines::query(&client, resource, user_id, question).await,
    }
}
