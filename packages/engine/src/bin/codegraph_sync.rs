//! Binary entry point for the `codegraph-sync` CLI.

use std::time::Duration;

use clap::Parser as _;
use codegraph_sync_engine::cli::{Cli, Command, RollbackAction};
use codegraph_sync_engine::config::EngineConfig;
use codegraph_sync_engine::coordinator::{FullSyncOptions, IncrementalOptions, RollbackToOptions};
use codegraph_sync_engine::{telemetry, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(batch_size) = cli.batch_size {
        config.entity_batch_size = batch_size;
        config.relationship_batch_size = batch_size;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.max_concurrent_batches = max_concurrent;
    }

    let engine = Engine::new(config);
    engine.start();

    let exit_code = run(&engine, cli).await;

    engine.stop().await;
    std::process::exit(exit_code);
}

async fn run(engine: &Engine, cli: Cli) -> i32 {
    match cli.command {
        Command::Sync { dirs, incremental } => {
            if cli.dry_run {
                if !cli.quiet {
                    println!("dry run: skipping commit to the graph store");
                }
                return 0;
            }

            let roots = if dirs.is_empty() { vec![std::env::current_dir().unwrap_or_default()] } else { dirs };

            let result = if incremental {
                let changes = roots
                    .into_iter()
                    .map(|path| codegraph_core::FileChangeEvent {
                        path: path.clone(),
                        change_type: codegraph_core::FileChangeKind::Modify,
                        absolute_path: path,
                        timestamp_millis: 0,
                    })
                    .collect();
                engine.coordinator.start_incremental(changes, IncrementalOptions::default()).await
            } else {
                engine.coordinator.start_full(roots, FullSyncOptions::default()).await
            };

            match result {
                Ok(op) => {
                    if !cli.quiet {
                        println!(
                            "operation {} status={:?} files_processed={} errors={}",
                            op.id,
                            op.status,
                            op.files_processed,
                            op.errors.len()
                        );
                    }
                    if op.status == codegraph_core::SyncOperationStatus::Completed {
                        0
                    } else {
                        1
                    }
                }
                Err(e) => {
                    eprintln!("sync failed: {e}");
                    1
                }
            }
        }

        Command::Rollback { action } => run_rollback(engine, action, cli.quiet).await,
    }
}

async fn run_rollback(engine: &Engine, action: RollbackAction, quiet: bool) -> i32 {
    match action {
        RollbackAction::Create { name, description, ttl } => {
            let ttl = ttl.map(Duration::from_secs);
            match engine.rollback_store.store(name, description, None, ttl, serde_json::Map::new()).await {
                Ok(point) => {
                    if !quiet {
                        println!("created rollback point {}", point.id);
                    }
                    0
                }
                Err(e) => {
                    eprintln!("create failed: {e}");
                    1
                }
            }
        }

        RollbackAction::List => {
            let points = engine.rollback_store.list().await;
            if !quiet {
                for point in &points {
                    println!("{} {} created_at={}", point.id, point.name, point.timestamp_millis);
                }
            }
            0
        }

        RollbackAction::To { id, strategy, no_embeddings } => {
            let options = RollbackToOptions { strategy, no_embeddings };
            match engine.coordinator.rollback_to(&id, options).await {
                Ok(op) => {
                    if !quiet {
                        println!("rollback {} status={:?}", op.id, op.status);
                    }
                    0
                }
                Err(e) => {
                    eprintln!("rollback failed: {e}");
                    1
                }
            }
        }
    }
}
