//! CLI binary entry point for songplay-etl

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use songplay_warehouse::cli::commands::etl::{EtlAction, EtlArgs, handle_etl};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "songplay-etl")]
#[command(about = "Load, transform and deduplicate song-play events into the warehouse")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $SONGPLAY_CONFIG, then ./dwh.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Run the full ETL: staging, dimensions, facts, deduplication (default)
    Run,
    /// Drop and recreate the staging and star-schema tables
    ResetSchema,
    /// Only deduplicate the songs, artists and users tables
    Dedup,
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let action = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => EtlAction::Run,
        Commands::ResetSchema => EtlAction::ResetSchema,
        Commands::Dedup => EtlAction::Dedup,
    };

    let args = EtlArgs {
        config: cli.config,
        action,
    };

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn run(args: &EtlArgs) -> anyhow::Result<()> {
    handle_etl(args)?;
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
