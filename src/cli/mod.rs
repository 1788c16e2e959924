//! CLI module for Densex
//!
//! Provides commands:
//! - `serve`: HTTP chat server
//! - `ingest`: Parse, chunk, embed and index documents
//! - `ask`: One question from the terminal
//! - `usage`: Per-service cost totals from the usage log

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod ask;
pub mod ingest;
pub mod usage;

/// Densex document chat CLI
#[derive(Parser, Debug)]
#[command(name = "densex")]
#[command(about = "Retrieval-augmented chat over your documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the chat server
    Serve,
    /// Add documents (.txt, .md, .pdf) to the index
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Maximum characters per passage
        #[arg(long, default_value_t = ingest::DEFAULT_MAX_CHARS)]
        max_chars: usize,
    },
    /// Ask a single question
    Ask {
        /// The question
        question: String,
    },
    /// Show cost totals per service
    Usage {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Ingest { paths, max_chars }) => ingest::run(&paths, max_chars).await,
        Some(Commands::Ask { question }) => ask::run(&question).await,
        Some(Commands::Usage { json }) => usage::run(json).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
