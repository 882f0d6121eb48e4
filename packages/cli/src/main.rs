mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{inspect, upgrade, verify, InspectArgs, UpgradeArgs, VerifyArgs};

/// Arbor CLI - inspect and maintain shared tree summaries
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a summary's metadata and tree
    Inspect(InspectArgs),

    /// Replay a summary's history and report edit outcomes
    Verify(VerifyArgs),

    /// Rewrite a summary in the current format
    Upgrade(UpgradeArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{} cannot read current directory: {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Inspect(args) => inspect(args, &cwd),
        Command::Verify(args) => verify(args, &cwd),
        Command::Upgrade(args) => upgrade(args, &cwd),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
