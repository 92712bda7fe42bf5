mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "forge",
    about = "Execute model-generated actions (shell commands, file writes, imports) in a sandbox",
    version,
    propagate_version = true
)]
struct Cli {
    /// Engine config file (YAML). Defaults to <root>/forge.yaml
    #[arg(long, global = true, env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Sandbox root directory on the host (default: current directory)
    #[arg(long, global = true, env = "FORGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log engine activity at info level
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSONL stream of parser events and report the final state
    Replay {
        /// Event file, or `-` for stdin
        input: String,

        /// Print engine events while the replay runs
        #[arg(long, short = 'f')]
        follow: bool,
    },

    /// Show the effective configuration and any warnings
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = cli
        .root
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let config_path = cli.config.unwrap_or_else(|| root.join("forge.yaml"));

    let result = match cli.command {
        Commands::Replay { input, follow } => {
            cmd::replay::run(&root, &config_path, &input, follow, cli.json)
        }
        Commands::Config => cmd::config::run(&config_path, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
