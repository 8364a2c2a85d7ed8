//! Tiered CLI: run steps and drive swarms against the tiered execution core.

use clap::{Parser, Subcommand};

use tiered_cli::commands;

/// Tiered CLI: tiered execution core
#[derive(Parser)]
#[command(name = "tiered", version, about = "Tiered CLI: run steps and drive swarms")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "TIERED_DB_PATH", default_value = "tiered.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request (JSON or YAML) through the coordinator
    Run {
        /// Path to the request file
        #[arg(long)]
        file: String,
    },

    /// Manage swarms
    Swarm {
        #[command(subcommand)]
        action: SwarmAction,
    },

    /// Render a template against inputs
    Template {
        /// Template text, e.g. "{{input.city}}-{{now()}}"
        #[arg(long)]
        template: String,
        /// Inputs as a JSON object of name to value
        #[arg(long, default_value = "{}")]
        inputs: String,
        /// Preferred languages (comma-separated)
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,
    },

    /// Show tier health
    Status,
}

#[derive(Subcommand)]
enum SwarmAction {
    /// Start (or reuse) a swarm
    Start {
        /// What the swarm should accomplish
        #[arg(long)]
        goal: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Swarm ID; generated when omitted
        #[arg(long)]
        swarm_id: Option<String>,
        /// Parent swarm ID
        #[arg(long)]
        parent: Option<String>,
        /// User the swarm runs for
        #[arg(long, env = "TIERED_USER_ID", default_value = "local")]
        user: String,
    },
    /// Get a swarm by ID
    Get {
        #[arg(long)]
        id: String,
    },
    /// List all swarms
    List,
    /// Update a swarm's lifecycle status
    Status {
        #[arg(long)]
        id: String,
        /// New status: pending, running, paused, completed, failed, cancelled
        #[arg(long)]
        status: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_core=info,tiered_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Run { file } => {
            let state = commands::init_state(&cli.db).await;
            commands::run::run(&state, &file).await
        }

        Commands::Swarm { action } => {
            let state = commands::init_state(&cli.db).await;
            match action {
                SwarmAction::Start {
                    goal,
                    name,
                    swarm_id,
                    parent,
                    user,
                } => commands::swarm::start(&state, &goal, name, swarm_id, parent, &user).await,
                SwarmAction::Get { id } => commands::swarm::get(&state, &id).await,
                SwarmAction::List => commands::swarm::list(&state).await,
                SwarmAction::Status { id, status } => {
                    commands::swarm::update_status(&state, &id, &status).await
                }
            }
        }

        Commands::Template {
            template,
            inputs,
            languages,
        } => commands::template::run(&template, &inputs, &languages),

        Commands::Status => {
            let state = commands::init_state(&cli.db).await;
            commands::status::run(&state).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
