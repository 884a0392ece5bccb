//! kf-worker: the pipeline's moving parts.
//!
//! Stage workers poll their channels through the [`harness`], fire
//! transitions through [`machine`], and hand finished tracks to the
//! [`completion`] detector. [`start`] opens the database, builds a
//! [`WorkerContext`] and runs the requested stages until shutdown.

pub mod completion;
pub mod context;
pub mod harness;
pub mod intake;
pub mod machine;
pub mod stages;

#[cfg(test)]
mod testing;

pub use context::WorkerContext;
pub use harness::{process_next, run_task, Outcome, Task, WorkItem};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kf_core::config::Config;
use kf_core::{Channel, Error, Result};
use kf_db::{DbPool, SqliteQueue};
use kf_tools::{DockerRunner, ToolRegistry};

use stages::{
    CleanupStage, DownloadStage, EncodeStage, KeyDetectStage, MetadataStage, RekeyStage,
    SplitStage, UploadStage,
};

/// Open the configured database, creating its directory if needed.
pub fn open_db(config: &Config) -> Result<DbPool> {
    let db_path = &config.database.path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }

    let db = kf_db::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }
    Ok(db)
}

/// Create every storage directory shared with the containers.
pub fn prepare_storage(config: &Config) -> Result<()> {
    for dir in config.storage.all_dirs() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            tracing::info!("Created storage directory {}", dir.display());
        }
    }
    Ok(())
}

/// Build a context backed by the configured database and docker.
///
/// The docker binary is resolved lazily: a missing runtime only fails the
/// first container run, so commands that never run one still work.
pub fn connect(config: Config) -> Result<WorkerContext> {
    let db = open_db(&config)?;
    let registry = ToolRegistry::discover(&config.containers);
    let docker = registry
        .require("docker")
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| PathBuf::from("docker"));

    let queue = Arc::new(SqliteQueue::new(db.clone()));
    let runner = Arc::new(DockerRunner::new(docker, config.containers.timeout()));
    Ok(WorkerContext::new(db, queue, runner, Arc::new(config)))
}

/// Spawn one polling loop for `channel`.
pub fn spawn_stage(ctx: WorkerContext, channel: Channel, cancel: CancellationToken) -> JoinHandle<()> {
    match channel {
        Channel::Metadata => tokio::spawn(run_task(ctx, MetadataStage, cancel)),
        Channel::Download => tokio::spawn(run_task(ctx, DownloadStage, cancel)),
        Channel::KeyDetect => tokio::spawn(run_task(ctx, KeyDetectStage, cancel)),
        Channel::Split => tokio::spawn(run_task(ctx, SplitStage, cancel)),
        Channel::Rekey => tokio::spawn(run_task(ctx, RekeyStage, cancel)),
        Channel::Encode => tokio::spawn(run_task(ctx, EncodeStage, cancel)),
        Channel::Upload => tokio::spawn(run_task(ctx, UploadStage, cancel)),
        Channel::Cleanup => tokio::spawn(run_task(ctx, CleanupStage, cancel)),
    }
}

/// Run `instances` loops per stage until a shutdown signal or `cancel`.
pub async fn run_stages(
    ctx: WorkerContext,
    stages: &[Channel],
    instances: usize,
    cancel: CancellationToken,
) {
    let mut handles = Vec::with_capacity(stages.len() * instances);
    for &channel in stages {
        for _ in 0..instances {
            handles.push(spawn_stage(ctx.clone(), channel, cancel.clone()));
        }
    }
    tracing::info!(stages = stages.len(), instances, "Workers running");

    shutdown_signal(cancel.clone()).await;
    cancel.cancel();

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            tracing::error!("Stage worker task failed: {e}");
        }
    }
    tracing::info!("Workers stopped");
}

/// Start workers for `stages` (all stages when empty).
///
/// Returns after a shutdown signal once every loop has finished its current
/// job.
pub async fn start(config: Config, stages: &[Channel], instances: Option<usize>) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    prepare_storage(&config)?;

    let registry = ToolRegistry::discover(&config.containers);
    for info in registry.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        }
    }
    registry.require("docker")?;

    let instances = instances.unwrap_or(config.worker.instances);
    if instances == 0 {
        return Err(Error::Validation("at least one worker instance is required".into()));
    }
    let stages = if stages.is_empty() { Channel::ALL } else { stages };

    let ctx = connect(config)?;
    run_stages(ctx, stages, instances, CancellationToken::new()).await;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
