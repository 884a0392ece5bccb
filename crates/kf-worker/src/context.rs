//! Explicit client objects shared by every worker.

use std::sync::Arc;

use kf_core::config::Config;
use kf_core::{Channel, JobRef, Result};
use kf_db::{DbPool, JobQueue, PooledConnection};
use kf_tools::ToolRunner;

/// Everything a stage needs to do its job.
///
/// This is cheaply cloneable because it only holds the pool and `Arc`s.
/// Nothing in the worker crate reaches for process-wide state; tests build
/// a context around an in-memory pool and a fake runner.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: DbPool,
    pub queue: Arc<dyn JobQueue>,
    pub runner: Arc<dyn ToolRunner>,
    pub config: Arc<Config>,
}

impl WorkerContext {
    pub fn new(
        db: DbPool,
        queue: Arc<dyn JobQueue>,
        runner: Arc<dyn ToolRunner>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            queue,
            runner,
            config,
        }
    }

    pub fn conn(&self) -> Result<PooledConnection> {
        kf_db::get_conn(&self.db)
    }

    /// Encode and push a reference.
    pub fn push(&self, channel: Channel, job: &JobRef) -> Result<()> {
        self.queue.push(channel, &job.encode())
    }
}
