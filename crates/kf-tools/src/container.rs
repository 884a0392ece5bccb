//! Containerized tool invocations.
//!
//! Every compute-heavy stage runs one container: a fixed image, a fixed
//! execution user, one or two bind mounts and a command built from the
//! entity being processed. Stage code describes the run as a
//! [`ContainerInvocation`] and hands it to a [`ToolRunner`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use kf_core::{Error, Result};

use crate::command::{ToolCommand, ToolOutput};

/// One bind mount of a host directory into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Mount {
    /// Render as a `-v` value. Docker requires absolute host paths.
    fn volume_arg(&self) -> Result<String> {
        let host = std::path::absolute(&self.host)?;
        let mut arg = format!("{}:{}", host.display(), self.container);
        if self.read_only {
            arg.push_str(":ro");
        }
        Ok(arg)
    }
}

/// Everything needed to run a stage tool once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInvocation {
    pub image: String,
    pub user: Option<String>,
    pub mounts: Vec<Mount>,
    pub args: Vec<String>,
}

impl ContainerInvocation {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            user: None,
            mounts: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Run as `uid:gid`.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Bind-mount a host directory read-write.
    pub fn mount(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.mounts.push(Mount {
            host: host.into(),
            container: container.into(),
            read_only: false,
        });
        self
    }

    /// Bind-mount a host directory read-only.
    pub fn mount_ro(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.mounts.push(Mount {
            host: host.into(),
            container: container.into(),
            read_only: true,
        });
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Map a path as seen inside the container back to the host, using the
    /// deepest mount that contains it.
    pub fn host_path(&self, container_path: &str) -> Option<PathBuf> {
        let target = Path::new(container_path);
        self.mounts
            .iter()
            .filter_map(|m| {
                target
                    .strip_prefix(&m.container)
                    .ok()
                    .map(|rest| (m.container.len(), m.host.join(rest)))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, host)| host)
    }

    /// Arguments for `docker`, starting with `run`.
    pub fn docker_args(&self) -> Result<Vec<String>> {
        let mut out = vec!["run".to_string(), "--rm".to_string()];
        if let Some(user) = &self.user {
            out.push("-u".into());
            out.push(user.clone());
        }
        for mount in &self.mounts {
            out.push("-v".into());
            out.push(mount.volume_arg()?);
        }
        out.push(self.image.clone());
        out.extend(self.args.iter().cloned());
        Ok(out)
    }
}

/// Executes container invocations.
///
/// Worker code only sees this trait, so tests can substitute a runner that
/// fabricates tool outputs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion. A non-zero exit is an error.
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ToolOutput>;
}

/// [`ToolRunner`] backed by the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker: PathBuf,
    timeout: Option<Duration>,
}

impl DockerRunner {
    pub fn new(docker: PathBuf, timeout: Option<Duration>) -> Self {
        Self { docker, timeout }
    }
}

#[async_trait]
impl ToolRunner for DockerRunner {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ToolOutput> {
        let args = invocation.docker_args()?;
        tracing::info!(image = %invocation.image, command = %invocation.args.join(" "), "Running container");

        let output = ToolCommand::new(self.docker.clone())
            .args(args)
            .timeout(self.timeout)
            .execute()
            .await
            .map_err(|e| match e {
                Error::Tool { message, .. } => Error::tool(&invocation.image, message),
                other => other,
            })?;

        tracing::debug!(image = %invocation.image, stdout = %output.stdout.trim(), "Container finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContainerInvocation {
        ContainerInvocation::new("keyforge/rubberband:latest")
            .user("1000:1000")
            .mount("/data/splits", "/input")
            .mount("/data/rekeyed", "/output")
            .args(["-3", "/input/7/accompaniment.wav", "/output/A-x.9.wav"])
    }

    #[test]
    fn docker_args_layout() {
        let args = sample().docker_args().unwrap();
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-u",
                "1000:1000",
                "-v",
                "/data/splits:/input",
                "-v",
                "/data/rekeyed:/output",
                "keyforge/rubberband:latest",
                "-3",
                "/input/7/accompaniment.wav",
                "/output/A-x.9.wav",
            ]
        );
    }

    #[test]
    fn read_only_mount_and_no_user() {
        let args = ContainerInvocation::new("amazon/aws-cli")
            .mount_ro("/home/u/.aws", "/root/.aws")
            .docker_args()
            .unwrap();
        assert_eq!(args[2], "-v");
        assert_eq!(args[3], "/home/u/.aws:/root/.aws:ro");
    }

    #[test]
    fn relative_mounts_are_made_absolute() {
        let args = ContainerInvocation::new("img")
            .mount("data/downloads", "/output")
            .docker_args()
            .unwrap();
        let volume = &args[3];
        assert!(Path::new(volume.split(':').next().unwrap()).is_absolute(), "{volume}");
    }

    #[test]
    fn host_path_mapping() {
        let inv = sample();
        assert_eq!(
            inv.host_path("/output/A-x.9.wav"),
            Some(PathBuf::from("/data/rekeyed/A-x.9.wav"))
        );
        assert_eq!(
            inv.host_path("/input/7/accompaniment.wav"),
            Some(PathBuf::from("/data/splits/7/accompaniment.wav"))
        );
        assert_eq!(inv.host_path("/tmp/elsewhere"), None);
    }

    #[test]
    fn host_path_prefers_deepest_mount() {
        let inv = ContainerInvocation::new("img")
            .mount("/a", "/work")
            .mount("/b", "/work/nested");
        assert_eq!(inv.host_path("/work/nested/f"), Some(PathBuf::from("/b/f")));
        assert_eq!(inv.host_path("/work/f"), Some(PathBuf::from("/a/f")));
    }

    #[tokio::test]
    async fn missing_docker_binary_is_tool_error() {
        let runner = DockerRunner::new(PathBuf::from("/nonexistent/docker-xyz"), None);
        let err = runner.run(&sample()).await.unwrap_err();
        assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "keyforge/rubberband:latest"));
    }
}
