//! `codegraph-sync` command surface: `clap` derive definitions consumed by
//! `src/bin/codegraph_sync.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "codegraph-sync", version, about = "Code-knowledge-graph ingestion engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress progress output; only the final result and errors print.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Fixed-size chunk used for entity/relationship micro-batches.
    #[arg(long, global = true, env = "CODEGRAPH_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Number of micro-batch chunks run concurrently per group.
    #[arg(long, global = true, env = "CODEGRAPH_MAX_CONCURRENT")]
    pub max_concurrent: Option<usize>,

    /// Parse and batch without committing to the graph store.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs a full sync over one or more root directories.
    Sync {
        /// Root directories to scan. Defaults to the current directory.
        #[arg(long = "dir")]
        dirs: Vec<PathBuf>,

        /// Run an incremental sync instead of a full sync.
        #[arg(long)]
        incremental: bool,
    },

    /// Rollback point management.
    Rollback {
        #[command(subcommand)]
        action: RollbackAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum RollbackAction {
    /// Creates a new rollback point from current state.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Time-to-live in seconds. Omit for a point that never expires.
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Lists all live rollback points.
    List,

    /// Restores graph state to a rollback point.
    To {
        id: String,
        #[arg(long, value_parser = ["full", "partial"])]
        strategy: Option<String>,
        #[arg(long)]
        no_embeddings: bool,
    },
}
