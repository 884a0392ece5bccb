//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`WorkerContext`] to an in-memory
//! DB, storage directories under a temp dir and a [`FakeRunner`] that plays
//! the part of every stage container by writing the files the real tool
//! would produce.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use kf_core::config::{Config, StorageConfig};
use kf_core::{Channel, Error, Result, TrackFlags, TrackId};
use kf_db::models::{Track, TrackFile};
use kf_db::queries::{track_files, tracks};
use kf_db::{init_memory_pool, DbPool, SqliteQueue};
use kf_tools::{ContainerInvocation, ToolOutput, ToolRunner};
use kf_worker::stages::{
    CleanupStage, DownloadStage, EncodeStage, KeyDetectStage, MetadataStage, RekeyStage,
    SplitStage, UploadStage,
};
use kf_worker::{process_next, Outcome, WorkerContext};

/// What the fake tools report about the source.
#[derive(Debug, Clone)]
pub struct FakeSource {
    pub title: String,
    pub duration_secs: f64,
    pub key: String,
    pub scale: String,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            title: "Hello World".into(),
            duration_secs: 215.0,
            key: "C".into(),
            scale: "major".into(),
        }
    }
}

/// [`ToolRunner`] that emulates each stage container.
///
/// Test configs name every stage image `fake/<channel>`, so the runner can
/// tell stages apart even where the real images are shared.
pub struct FakeRunner {
    pub source: FakeSource,
    pub calls: Mutex<Vec<ContainerInvocation>>,
    failing: Option<Channel>,
    silent: Option<Channel>,
}

impl FakeRunner {
    pub fn new(source: FakeSource) -> Self {
        Self {
            source,
            calls: Mutex::new(Vec::new()),
            failing: None,
            silent: None,
        }
    }

    /// A runner whose `channel` container always exits non-zero.
    pub fn failing(source: FakeSource, channel: Channel) -> Self {
        Self {
            failing: Some(channel),
            ..Self::new(source)
        }
    }

    /// A runner whose `channel` container exits cleanly but writes nothing.
    pub fn silent(source: FakeSource, channel: Channel) -> Self {
        Self {
            silent: Some(channel),
            ..Self::new(source)
        }
    }

    pub fn calls_for(&self, channel: Channel) -> Vec<ContainerInvocation> {
        let image = fake_image(channel);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.image == image)
            .cloned()
            .collect()
    }

    fn emulate(&self, channel: Channel, inv: &ContainerInvocation) -> std::io::Result<()> {
        match channel {
            Channel::Metadata => {
                let base = host(inv, arg_after(inv, "-o"));
                let info = serde_json::json!({
                    "title": self.source.title,
                    "duration": self.source.duration_secs,
                    "duration_string": "3:35",
                    "thumbnails": [
                        {"url": "https://i.test/max.jpg", "height": 1080, "width": 1920},
                        {"url": "https://i.test/mq.jpg", "height": 180, "width": 320}
                    ]
                });
                write(&PathBuf::from(format!("{}.info.json", base.display())), info.to_string())
            }
            Channel::Download => write(&host(inv, arg_after(inv, "-o")), "RIFF"),
            Channel::KeyDetect => {
                let key = serde_json::json!({"key": self.source.key, "scale": self.source.scale});
                write(&host(inv, last_arg(inv)), key.to_string())
            }
            Channel::Split => {
                let input = Path::new(last_arg(inv));
                let id = input.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                let out = host(inv, "/output").join(id);
                write(&out.join("accompaniment.wav"), "RIFF")?;
                write(&out.join("vocals.wav"), "RIFF")
            }
            Channel::Rekey | Channel::Encode => write(&host(inv, last_arg(inv)), "data"),
            Channel::Upload | Channel::Cleanup => Ok(()),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let channel = invocation
            .image
            .strip_prefix("fake/")
            .and_then(|c| c.parse::<Channel>().ok())
            .ok_or_else(|| Error::tool(&invocation.image, "unknown fake image"))?;

        if self.failing == Some(channel) {
            return Err(Error::tool(&invocation.image, "exited with status 1: simulated failure"));
        }
        if self.silent != Some(channel) {
            self.emulate(channel, invocation)?;
        }

        Ok(ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

fn fake_image(channel: Channel) -> String {
    format!("fake/{channel}")
}

fn arg_after<'a>(inv: &'a ContainerInvocation, flag: &str) -> &'a str {
    let pos = inv.args.iter().position(|a| a == flag).unwrap();
    &inv.args[pos + 1]
}

fn last_arg(inv: &ContainerInvocation) -> &str {
    inv.args.last().unwrap()
}

fn host(inv: &ContainerInvocation, container_path: &str) -> PathBuf {
    inv.host_path(container_path)
        .unwrap_or_else(|| panic!("{container_path} is not under a mount of {}", inv.image))
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

/// Test harness wrapping a [`WorkerContext`] backed by an in-memory database.
pub struct TestHarness {
    pub ctx: WorkerContext,
    pub db: DbPool,
    pub runner: Arc<FakeRunner>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_runner(FakeRunner::new(FakeSource::default()))
    }

    pub fn with_source(source: FakeSource) -> Self {
        Self::with_runner(FakeRunner::new(source))
    }

    pub fn with_runner(runner: FakeRunner) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = test_config(dir.path());
        kf_worker::prepare_storage(&config).expect("failed to create storage");

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let runner = Arc::new(runner);
        let ctx = WorkerContext::new(
            db.clone(),
            Arc::new(SqliteQueue::new(db.clone())),
            runner.clone(),
            Arc::new(config),
        );

        Self {
            ctx,
            db,
            runner,
            dir,
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.ctx.config.storage
    }

    pub fn submit(&self, flags: TrackFlags) -> Track {
        kf_worker::intake::submit(&self.ctx, "https://www.youtube.com/watch?v=abc", flags, Some("ana"))
            .expect("submit failed")
    }

    pub fn track(&self, id: TrackId) -> Track {
        let conn = self.db.get().unwrap();
        tracks::get_track(&conn, id).unwrap().expect("track missing")
    }

    pub fn files(&self, id: TrackId) -> Vec<TrackFile> {
        let conn = self.db.get().unwrap();
        track_files::list_for_track(&conn, id).unwrap()
    }

    /// Poll `channel` once with its stage.
    pub async fn step(&self, channel: Channel) -> Outcome {
        let ctx = &self.ctx;
        let outcome = match channel {
            Channel::Metadata => process_next(ctx, &MetadataStage).await,
            Channel::Download => process_next(ctx, &DownloadStage).await,
            Channel::KeyDetect => process_next(ctx, &KeyDetectStage).await,
            Channel::Split => process_next(ctx, &SplitStage).await,
            Channel::Rekey => process_next(ctx, &RekeyStage).await,
            Channel::Encode => process_next(ctx, &EncodeStage).await,
            Channel::Upload => process_next(ctx, &UploadStage).await,
            Channel::Cleanup => process_next(ctx, &CleanupStage).await,
        };
        outcome.expect("infrastructure error")
    }

    /// Drain `channel` until it is empty; returns the jobs processed.
    pub async fn drain(&self, channel: Channel) -> usize {
        let mut n = 0;
        while self.step(channel).await != Outcome::Idle {
            n += 1;
        }
        n
    }

    /// Run every stage round-robin until all channels are empty.
    pub async fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let mut round = 0;
            for &channel in Channel::ALL {
                round += self.drain(channel).await;
            }
            if round == 0 {
                return total;
            }
            total += round;
        }
    }
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = root.join("kf.db");
    config.storage = StorageConfig {
        download_dir: root.join("downloads"),
        key_dir: root.join("keys"),
        split_dir: root.join("splits"),
        rekey_dir: root.join("rekeyed"),
    };
    for channel in Channel::ALL {
        let stage = match channel {
            Channel::Metadata => &mut config.containers.metadata,
            Channel::Download => &mut config.containers.download,
            Channel::KeyDetect => &mut config.containers.key_detect,
            Channel::Split => &mut config.containers.split,
            Channel::Rekey => &mut config.containers.rekey,
            Channel::Encode => &mut config.containers.encode,
            Channel::Upload => &mut config.containers.upload,
            Channel::Cleanup => continue,
        };
        stage.image = fake_image(*channel);
    }
    config
}
