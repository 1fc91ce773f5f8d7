//! The resolved, immutable xpulumi configuration.

use crate::file::{update_config_key, ConfigFormat};
use serde_json::Value;
use std::path::{Path, PathBuf};
use xpulumi_core::constants::XPULUMI_INFRA_DIRNAME;
use xpulumi_core::Result;

/// Immutable configuration with every path fully resolved.
///
/// Constructed by [`crate::ConfigLoader`]; shared across components as
/// `Arc<XpulumiConfig>`. Mutating operations (`set_default_backend`,
/// `set_default_stack`) rewrite the config file on disk and leave the
/// in-memory value untouched; callers that need the new state reload.
#[derive(Debug, Clone)]
pub struct XpulumiConfig {
    /// The config file discovery settled on.
    pub config_file: PathBuf,

    /// Serialization format of `config_file`.
    pub format: ConfigFormat,

    /// Absolute directory owning the project-local Pulumi installation.
    pub xpulumi_dir: PathBuf,

    /// Absolute project root; `xpulumi.d/` lives directly beneath it.
    pub project_root_dir: PathBuf,

    /// Absolute `PULUMI_HOME` for wrapped invocations.
    pub pulumi_home: PathBuf,

    /// Backend used when none is named explicitly.
    pub default_backend_name: Option<String>,

    /// Stack injected into wrapped commands when none is named explicitly.
    pub default_stack_name: Option<String>,

    /// Pinned Pulumi CLI version; `None` means track the latest release.
    pub pulumi_version: Option<String>,
}

impl XpulumiConfig {
    /// `<project_root>/xpulumi.d`
    #[must_use]
    pub fn infra_dir(&self) -> PathBuf {
        self.project_root_dir.join(XPULUMI_INFRA_DIRNAME)
    }

    /// `<project_root>/xpulumi.d/backend`
    #[must_use]
    pub fn backend_infra_dir(&self) -> PathBuf {
        self.infra_dir().join("backend")
    }

    /// `<project_root>/xpulumi.d/project`
    #[must_use]
    pub fn project_infra_dir(&self) -> PathBuf {
        self.infra_dir().join("project")
    }

    /// Directory declaring the named backend.
    #[must_use]
    pub fn backend_dir(&self, backend_name: &str) -> PathBuf {
        self.backend_infra_dir().join(backend_name)
    }

    /// Directory declaring the named project.
    #[must_use]
    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.project_infra_dir().join(project_name)
    }

    /// `<pulumi_home>/bin`
    #[must_use]
    pub fn pulumi_bin_dir(&self) -> PathBuf {
        self.pulumi_home.join("bin")
    }

    /// The wrapped Pulumi executable.
    #[must_use]
    pub fn pulumi_exe(&self) -> PathBuf {
        self.pulumi_bin_dir().join("pulumi")
    }

    /// If `dir` lies inside a project's infra directory, the project name.
    #[must_use]
    pub fn project_name_for_dir(&self, dir: &Path) -> Option<String> {
        let rel = dir.strip_prefix(self.project_infra_dir()).ok()?;
        let first = rel.components().next()?;
        Some(first.as_os_str().to_string_lossy().into_owned())
    }

    /// Persist a new default backend to the config file.
    pub fn set_default_backend(&self, backend_name: &str) -> Result<()> {
        update_config_key(
            &self.config_file,
            "default_backend",
            Value::String(backend_name.to_string()),
        )
    }

    /// Persist a new default stack to the config file.
    pub fn set_default_stack(&self, stack_name: &str) -> Result<()> {
        update_config_key(
            &self.config_file,
            "default_stack",
            Value::String(stack_name.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XpulumiConfig {
        XpulumiConfig {
            config_file: PathBuf::from("/repo/xpulumi.d/xpulumi.json"),
            format: ConfigFormat::Json,
            xpulumi_dir: PathBuf::from("/repo/xpulumi.d"),
            project_root_dir: PathBuf::from("/repo"),
            pulumi_home: PathBuf::from("/repo/xpulumi.d/.pulumi"),
            default_backend_name: Some("local".to_string()),
            default_stack_name: None,
            pulumi_version: None,
        }
    }

    #[test]
    fn derived_paths() {
        let cfg = sample();
        assert_eq!(cfg.infra_dir(), PathBuf::from("/repo/xpulumi.d"));
        assert_eq!(
            cfg.backend_dir("local"),
            PathBuf::from("/repo/xpulumi.d/backend/local")
        );
        assert_eq!(
            cfg.project_dir("vpc"),
            PathBuf::from("/repo/xpulumi.d/project/vpc")
        );
        assert_eq!(
            cfg.pulumi_exe(),
            PathBuf::from("/repo/xpulumi.d/.pulumi/bin/pulumi")
        );
    }

    #[test]
    fn project_inference_from_dir() {
        let cfg = sample();
        assert_eq!(
            cfg.project_name_for_dir(Path::new("/repo/xpulumi.d/project/vpc")),
            Some("vpc".to_string())
        );
        assert_eq!(
            cfg.project_name_for_dir(Path::new("/repo/xpulumi.d/project/vpc/sub/dir")),
            Some("vpc".to_string())
        );
        assert_eq!(cfg.project_name_for_dir(Path::new("/repo/src")), None);
        assert_eq!(
            cfg.project_name_for_dir(Path::new("/repo/xpulumi.d/project")),
            None
        );
    }
}
