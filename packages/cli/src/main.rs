mod commands;

use anyhow::Result;
use canvas_editor::EditorConfig;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{font, patches, replay, FontArgs, PatchesArgs, ReplayArgs};
use std::path::PathBuf;

/// Canvas CLI - replay, diff and font tooling for canvas documents
#[derive(Parser, Debug)]
#[command(name = "canvas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding canvas.config.json (defaults to current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an action log against a snapshot
    Replay(ReplayArgs),

    /// Resolve a font style against a pre-parsed registry
    Font(FontArgs),

    /// Print the JSON pointer patches between two snapshots
    Patches(PatchesArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = match cli.config {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = EditorConfig::load(&config_dir)?;

    match cli.command {
        Command::Replay(args) => replay(args, &config),
        Command::Font(args) => font(args).await,
        Command::Patches(args) => patches(args),
    }
}
