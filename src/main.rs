mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prefsync::config::PrefsyncConfig;

#[derive(Parser)]
#[command(name = "prefsync", version, about = "Per-conversation chat preference store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved preferences for a session
    Show {
        session: String,
        /// Print the raw stored record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one preference field and persist it
    Set {
        session: String,
        /// Field name: libraries, prompts, templates, policy, scope, deep-search, agent
        field: String,
        /// New value; lists are comma separated
        value: String,
    },
    /// Assign a session identifier and bind the chosen agent to it
    Bind {
        /// Session to bind; a new identifier is generated when omitted
        session: Option<String>,
        /// Agent chosen before the session existed
        #[arg(long)]
        agent: Option<String>,
    },
    /// Delete a session's preferences, binding, and cache entry
    Forget { session: String },
    /// Run database diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PrefsyncConfig::load()?;

    // stdout is reserved for command output
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Show { session, json } => cli::show::show(&config, &session, json).await?,
        Command::Set {
            session,
            field,
            value,
        } => cli::set::set(&config, &session, &field, &value).await?,
        Command::Bind { session, agent } => {
            cli::bind::bind(&config, session.as_deref(), agent.as_deref()).await?
        }
        Command::Forget { session } => cli::forget::forget(&config, &session).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
