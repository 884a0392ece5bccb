//! Shared fixtures for this crate's unit tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kf_core::config::{Config, StorageConfig};
use kf_core::Result;
use kf_db::{init_memory_pool, init_pool, DbPool, SqliteQueue};
use kf_tools::{ContainerInvocation, ToolOutput, ToolRunner};
use tempfile::TempDir;

use crate::context::WorkerContext;

type Script = dyn Fn(&ContainerInvocation) -> Result<()> + Send + Sync;

/// Runner that records every invocation and runs a script in place of the
/// container.
pub struct ScriptedRunner {
    pub calls: Mutex<Vec<ContainerInvocation>>,
    script: Box<Script>,
}

impl ScriptedRunner {
    pub fn new(script: impl Fn(&ContainerInvocation) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.script)(invocation)?;
        Ok(ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

fn config_in(root: &Path) -> Config {
    let storage = StorageConfig {
        download_dir: root.join("downloads"),
        key_dir: root.join("keys"),
        split_dir: root.join("splits"),
        rekey_dir: root.join("rekeyed"),
    };
    for dir in storage.all_dirs() {
        std::fs::create_dir_all(dir).unwrap();
    }
    Config {
        storage,
        ..Default::default()
    }
}

fn context_with(pool: DbPool, config: Config, runner: Arc<dyn ToolRunner>) -> WorkerContext {
    let queue = Arc::new(SqliteQueue::new(pool.clone()));
    WorkerContext::new(pool, queue, runner, Arc::new(config))
}

/// In-memory database, storage under a fresh temp dir, no-op runner.
pub fn test_context() -> (WorkerContext, TempDir) {
    scripted_context(Arc::new(ScriptedRunner::noop()))
}

pub fn scripted_context(runner: Arc<dyn ToolRunner>) -> (WorkerContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    (context_with(init_memory_pool().unwrap(), config, runner), dir)
}

/// File-backed database, for tests that contend from several threads.
pub fn file_context(root: &Path) -> WorkerContext {
    let pool = init_pool(&root.join("kf.db")).unwrap();
    context_with(pool, config_in(root), Arc::new(ScriptedRunner::noop()))
}
