mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "triage",
    about = "Compose, check and run bulk triage actions against a console backend",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .triage/)
    #[arg(long, global = true, env = "TRIAGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the operations available to the configured roles
    Operations {
        /// Include operations the configured roles cannot use
        #[arg(long)]
        all: bool,
    },

    /// Report why an action cannot run yet
    Check {
        /// Path to the action JSON file
        file: PathBuf,
        /// Also run the warn/error preview queries of every filled step
        #[arg(long)]
        preview: bool,
    },

    /// Execute an action file inline, streaming progress to stderr
    Run {
        /// Path to the action JSON file
        file: PathBuf,
    },

    /// Execute a saved action by id
    Apply {
        action_id: String,
        /// Run against this query instead of the saved one
        #[arg(long)]
        query: Option<String>,
    },

    /// Manage .triage/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Apply { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Operations { all } => cmd::operations::run(&root, all, cli.json),
        Commands::Check { file, preview } => cmd::check::run(&root, &file, preview, cli.json),
        Commands::Run { file } => cmd::run::run(&root, &file, cli.json),
        Commands::Apply { action_id, query } => {
            cmd::apply::run(&root, &action_id, query.as_deref(), cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
