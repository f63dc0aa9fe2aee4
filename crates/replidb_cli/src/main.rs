//! ReplIDB CLI
//!
//! Command-line tools for working with oplog dumps.
//!
//! # Commands
//!
//! - `replay` - Replicate a dump into a fresh replica and print the result
//! - `inspect` - List the operations of a dump

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ReplIDB command-line oplog tools.
#[derive(Parser)]
#[command(name = "replidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate a JSON-lines oplog dump into an in-memory replica
    Replay {
        /// Path to the oplog dump
        file: PathBuf,

        /// Apply updates as upserts (catch-up mode)
        #[arg(short, long)]
        upsert: bool,

        /// Operations per fetched batch
        #[arg(short, long, default_value = "100")]
        batch_size: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the operations of a JSON-lines oplog dump
    Inspect {
        /// Path to the oplog dump
        file: PathBuf,

        /// Maximum number of operations to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            file,
            upsert,
            batch_size,
            format,
        } => {
            commands::replay::run(&file, upsert, batch_size, &format)?;
        }
        Commands::Inspect {
            file,
            limit,
            format,
        } => {
            commands::inspect::run(&file, limit, &format)?;
        }
        Commands::Version => {
            println!("ReplIDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
