//! agentflow CLI: create, run and package agent flows from the terminal.

use agentflow_cli::commands::{self, StateOptions};
use clap::{Parser, Subcommand};

/// agentflow: step pipelines for LLM agents
#[derive(Parser)]
#[command(name = "agentflow", version, about = "agentflow: step pipelines for LLM agents")]
pub struct Cli {
    /// Path to the SQLite database file (defaults to {data-dir}/agentflow.db)
    #[arg(long, env = "AGENTFLOW_DB_PATH")]
    db: Option<String>,

    /// Engine configuration YAML
    #[arg(long, env = "AGENTFLOW_CONFIG")]
    config: Option<String>,

    /// Data directory for the database and knowledge indices
    #[arg(long, env = "AGENTFLOW_DATA_DIR")]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Define, run and package flows
    Flow {
        #[command(subcommand)]
        action: FlowAction,
    },

    /// Inspect and talk to individual agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(Subcommand)]
enum FlowAction {
    /// Validate a flow YAML file without storing it
    Validate {
        /// Path to the flow YAML file
        file: String,
    },
    /// Create a flow and its agents from a YAML file
    Create {
        /// Path to the flow YAML file
        file: String,
    },
    /// Send a message to a flow's entry agent
    Run {
        /// Flow YAML file to create and run in one go
        file: Option<String>,
        /// Id of an existing flow
        #[arg(long, conflicts_with = "file")]
        id: Option<String>,
        /// Message to send
        #[arg(long, short = 'm')]
        message: String,
    },
    /// Write a flow to a zip archive
    Save {
        /// Flow ID
        #[arg(long)]
        id: String,
        /// Output archive path
        #[arg(long)]
        out: String,
    },
    /// Restore a flow from a zip archive
    Load {
        /// Archive path; its file stem becomes the flow name
        archive: String,
    },
    /// List stored flows
    List,
    /// Delete a flow and its agents
    Delete {
        /// Flow ID
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List all agents
    List,
    /// Print an agent's conversation
    Chat {
        /// Agent ID
        #[arg(long)]
        id: String,
    },
    /// Reset an agent's conversation to its instruction
    Restart {
        /// Agent ID
        #[arg(long)]
        id: String,
    },
    /// Send a message to a single agent
    Send {
        /// Agent ID
        #[arg(long)]
        id: String,
        /// Message to send
        #[arg(long, short = 'm')]
        message: String,
    },
    /// Delete an agent and its conversation
    Delete {
        /// Agent ID
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentflow_core=warn,agentflow_cli=info".into()),
        )
        .init();

    let options = StateOptions {
        db: cli.db,
        config: cli.config,
        data_dir: cli.data_dir,
    };

    let result = match cli.command {
        // Validation never touches the database.
        Some(Commands::Flow {
            action: FlowAction::Validate { file },
        }) => commands::flow::validate(&file),
        Some(Commands::Flow { action }) => run_flow(action, &options).await,
        Some(Commands::Agent { action }) => run_agent(action, &options).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_flow(action: FlowAction, options: &StateOptions) -> Result<(), String> {
    let state = commands::init_state(options)?;
    match action {
        FlowAction::Validate { file } => commands::flow::validate(&file),
        FlowAction::Create { file } => commands::flow::create(&state, &file).await.map(|_| ()),
        FlowAction::Run { file, id, message } => {
            commands::flow::run(&state, file.as_deref(), id.as_deref(), &message).await
        }
        FlowAction::Save { id, out } => commands::flow::save(&state, &id, &out).await,
        FlowAction::Load { archive } => commands::flow::load(&state, &archive).await,
        FlowAction::List => commands::flow::list(&state).await,
        FlowAction::Delete { id } => commands::flow::delete(&state, &id).await,
    }
}

async fn run_agent(action: AgentAction, options: &StateOptions) -> Result<(), String> {
    let state = commands::init_state(options)?;
    match action {
        AgentAction::List => commands::agent::list(&state).await,
        AgentAction::Chat { id } => commands::agent::chat(&state, &id).await,
        AgentAction::Restart { id } => commands::agent::restart(&state, &id).await,
        AgentAction::Send { id, message } => commands::agent::send(&state, &id, &message).await,
        AgentAction::Delete { id } => commands::agent::delete(&state, &id).await,
    }
}
