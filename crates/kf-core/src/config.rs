//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! database location, worker tuning, storage directories, the container
//! contract of every stage, object-store settings and intake policy. Every
//! section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::status::Channel;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub containers: ContainersConfig,
    pub object_store: ObjectStoreConfig,
    pub policy: PolicyConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.worker.poll_interval_ms == 0 {
            warnings.push("worker.poll_interval_ms is 0; idle workers will spin".into());
        }
        if self.worker.instances == 0 {
            warnings.push("worker.instances is 0; no stage will be polled".into());
        }

        for (channel, stage) in self.containers.stages() {
            if stage.image.trim().is_empty() {
                warnings.push(format!("containers.{channel}.image is empty"));
            }
            if stage.command.is_empty() {
                warnings.push(format!("containers.{channel}.command is empty"));
            }
        }

        if self.containers.timeout_secs == Some(0) {
            warnings.push("containers.timeout_secs is 0; every tool call will time out".into());
        }

        if self.object_store.bucket.is_empty() {
            warnings.push("object_store.bucket is empty".into());
        }
        if self.object_store.host.is_empty() {
            warnings.push("object_store.host is empty".into());
        }

        if self.policy.max_duration_secs == 0 {
            warnings.push("policy.max_duration_secs is 0; every track will be rejected".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/keyforge.db"),
        }
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between pops on an empty channel.
    pub poll_interval_ms: u64,
    /// Polling loops started per stage by `keyforge work`.
    pub instances: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            instances: 1,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Host directories shared with the stage containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Downloader output: `<id>.info.json`, `<id>.wav`.
    pub download_dir: PathBuf,
    /// Key detector output: `<id>.key.json`.
    pub key_dir: PathBuf,
    /// Separator output: `<id>/accompaniment.wav`, `<id>/vocals.wav`.
    pub split_dir: PathBuf,
    /// Pitch shifter output: `<niceName>.wav`.
    pub rekey_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./data/downloads"),
            key_dir: PathBuf::from("./data/keys"),
            split_dir: PathBuf::from("./data/splits"),
            rekey_dir: PathBuf::from("./data/rekeyed"),
        }
    }
}

impl StorageConfig {
    /// Every storage directory, for creation at startup.
    pub fn all_dirs(&self) -> [&Path; 4] {
        [
            self.download_dir.as_path(),
            self.key_dir.as_path(),
            self.split_dir.as_path(),
            self.rekey_dir.as_path(),
        ]
    }
}

/// Image and command template of one stage container.
///
/// Command arguments are [`TemplateContext`](crate::template::TemplateContext)
/// templates. Each stage documents the variables it provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContainer {
    pub image: String,
    pub command: Vec<String>,
    /// Overrides [`ContainersConfig::user`] for this stage.
    #[serde(default)]
    pub user: Option<String>,
}

impl StageContainer {
    fn new(image: &str, command: &[&str]) -> Self {
        Self {
            image: image.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            user: None,
        }
    }
}

/// Container runtime settings and per-stage contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// Explicit docker binary; discovered on `PATH` when unset.
    pub docker_path: Option<PathBuf>,
    /// `uid:gid` every container runs as.
    pub user: String,
    /// Upper bound on one tool invocation. Unbounded when unset.
    pub timeout_secs: Option<u64>,
    pub metadata: StageContainer,
    pub download: StageContainer,
    pub key_detect: StageContainer,
    pub split: StageContainer,
    pub rekey: StageContainer,
    pub encode: StageContainer,
    pub upload: StageContainer,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            docker_path: None,
            user: "1000:1000".into(),
            timeout_secs: None,
            metadata: StageContainer::new(
                "jauderho/yt-dlp:latest",
                &[
                    "--write-info-json",
                    "--no-download",
                    "--force-overwrites",
                    "-o",
                    "/output/{id}",
                    "{url}",
                ],
            ),
            download: StageContainer::new(
                "jauderho/yt-dlp:latest",
                &[
                    "-x",
                    "--no-overwrites",
                    "--audio-format",
                    "wav",
                    "--audio-quality",
                    "0",
                    "-o",
                    "/output/{id}.wav",
                    "{url}",
                ],
            ),
            key_detect: StageContainer::new(
                "keyforge/key-detect:latest",
                &["/input/{id}.wav", "/output/{id}.key.json"],
            ),
            split: StageContainer::new(
                "researchdeezer/spleeter:3.8",
                &["separate", "-o", "/output", "/input/{id}.wav"],
            ),
            rekey: StageContainer::new(
                "keyforge/rubberband:latest",
                &["{offset}", "/input/{input}", "/output/{output}"],
            ),
            encode: StageContainer::new(
                "linuxserver/ffmpeg:latest",
                &[
                    "-y",
                    "-i",
                    "/work/{input}",
                    "-metadata",
                    "title={title}",
                    "/work/{output}",
                ],
            ),
            upload: StageContainer::new(
                "amazon/aws-cli:latest",
                &["s3", "cp", "/input/{input}", "s3://{bucket}/{name}"],
            ),
        }
    }
}

impl ContainersConfig {
    /// The container contract for a stage. Cleanup runs no container.
    pub fn stage(&self, channel: Channel) -> Option<&StageContainer> {
        match channel {
            Channel::Metadata => Some(&self.metadata),
            Channel::Download => Some(&self.download),
            Channel::KeyDetect => Some(&self.key_detect),
            Channel::Split => Some(&self.split),
            Channel::Rekey => Some(&self.rekey),
            Channel::Encode => Some(&self.encode),
            Channel::Upload => Some(&self.upload),
            Channel::Cleanup => None,
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = (Channel, &StageContainer)> {
        Channel::ALL
            .iter()
            .filter_map(|ch| self.stage(*ch).map(|stage| (*ch, stage)))
    }

    /// User a stage's container runs as.
    pub fn user_for<'a>(&'a self, stage: &'a StageContainer) -> &'a str {
        stage.user.as_deref().unwrap_or(&self.user)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Object store the encoded artifacts are published to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Host part of public URLs.
    pub host: String,
    pub bucket: String,
    /// Host directory with uploader credentials, mounted read-only.
    pub credentials_dir: Option<PathBuf>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            host: "s3.amazonaws.com".into(),
            bucket: "keyforge-tracks".into(),
            credentials_dir: None,
        }
    }
}

/// Intake policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Sources longer than this are rejected after metadata extraction.
    pub max_duration_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.database.path, PathBuf::from("./data/keyforge.db"));
        assert_eq!(cfg.worker.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.policy.max_duration_secs, 900);
        assert_eq!(cfg.object_store.host, "s3.amazonaws.com");
        assert_eq!(cfg.containers.timeout(), None);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.worker.instances, 1);
        assert_eq!(cfg.containers.split.image, "researchdeezer/spleeter:3.8");
    }

    #[test]
    fn parse_partial_json() {
        let json = r#"{
            "worker": {"poll_interval_ms": 250},
            "containers": {
                "timeout_secs": 600,
                "rekey": {"image": "local/rb", "command": ["{offset}", "{input}", "{output}"], "user": "0:0"}
            }
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.worker.poll_interval_ms, 250);
        assert_eq!(cfg.worker.instances, 1);
        assert_eq!(cfg.containers.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.containers.rekey.image, "local/rb");
        assert_eq!(cfg.containers.user_for(&cfg.containers.rekey), "0:0");
        assert_eq!(cfg.containers.user_for(&cfg.containers.encode), "1000:1000");
        assert_eq!(cfg.containers.download.image, "jauderho/yt-dlp:latest");
    }

    #[test]
    fn stage_lookup_skips_cleanup() {
        let cfg = ContainersConfig::default();
        assert!(cfg.stage(Channel::Cleanup).is_none());
        assert_eq!(cfg.stages().count(), 7);
    }

    #[test]
    fn malformed_json_is_validation_error() {
        let err = Config::from_json("{\"worker\": 3}").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_image_warns() {
        let mut cfg = Config::default();
        cfg.containers.upload.image = String::new();
        cfg.object_store.bucket = String::new();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("containers.upload.image")));
        assert!(warnings.iter().any(|w| w.contains("object_store.bucket")));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/keyforge.json")));
        assert_eq!(cfg.policy.max_duration_secs, 900);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyforge.json");
        std::fs::write(&path, r#"{"policy": {"max_duration_secs": 60}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path));
        assert_eq!(cfg.policy.max_duration_secs, 60);
    }
}
