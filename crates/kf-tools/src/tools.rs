//! External tool detection.
//!
//! keyforge only shells out to the container runtime; every stage tool lives
//! in an image. The [`ToolRegistry`] resolves the runtime binary once at
//! startup and reports its availability for `keyforge check-tools`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kf_core::config::ContainersConfig;
use kf_core::{Error, Result};
use serde::Serialize;

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["docker"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `--version` output, if available.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools, preferring an existing configured path over `PATH`.
    pub fn discover(config: &ContainersConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "docker" => config.docker_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured path missing; searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(name.to_string(), path);
            }
        }

        Self { tools }
    }

    /// Path of a discovered tool, or [`Error::Tool`] if it was not found.
    pub fn require(&self, name: &str) -> Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::tool(name, format!("{name} not found; is it installed and in PATH?")))
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> --version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("--version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_with_default_config() {
        let registry = ToolRegistry::discover(&ContainersConfig::default());
        // Docker may be absent in CI; the call itself must not panic.
        let infos = registry.check_all();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "docker");
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        let err = registry.require("docker").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn configured_path_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("docker");
        std::fs::write(&fake, "#!/bin/sh\necho 'Docker version 99.0'\n").unwrap();

        let config = ContainersConfig {
            docker_path: Some(fake.clone()),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&config);
        assert_eq!(registry.require("docker").unwrap(), fake.as_path());
    }
}
