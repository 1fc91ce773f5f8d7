//! Discovery-and-load pipeline producing an [`XpulumiConfig`].

use crate::config::XpulumiConfig;
use crate::discovery::locate_config_file;
use crate::file::{ConfigFileData, ConfigFormat};
use std::path::{Path, PathBuf};
use tracing::debug;
use xpulumi_core::constants::XPULUMI_CONFIG_ENV_VAR;
use xpulumi_core::paths::{abs_join, expand_user};
use xpulumi_core::{EnvironmentVariables, Error, Result, ResultExt};

/// Builder for loading the xpulumi configuration.
///
/// ```no_run
/// # use xpulumi_config::ConfigLoader;
/// # async fn demo() -> xpulumi_core::Result<()> {
/// let config = ConfigLoader::new().load().await?;
/// println!("project root: {}", config.project_root_dir.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    starting_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    env: Option<EnvironmentVariables>,
    scan_parent_dirs: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            starting_dir: None,
            config_path: None,
            env: None,
            scan_parent_dirs: true,
        }
    }

    /// Directory to start discovery from; defaults to the current directory.
    #[must_use]
    pub fn starting_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.starting_dir = Some(dir.into());
        self
    }

    /// Explicit config file or directory, bypassing the parent scan.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Environment snapshot consulted for `XPULUMI_CONFIG`; defaults to the
    /// process environment.
    #[must_use]
    pub fn env(mut self, env: EnvironmentVariables) -> Self {
        self.env = Some(env);
        self
    }

    /// Whether discovery may walk up into parent directories.
    #[must_use]
    pub fn scan_parent_dirs(mut self, scan: bool) -> Self {
        self.scan_parent_dirs = scan;
        self
    }

    /// Locate, read, and resolve the configuration.
    pub async fn load(self) -> Result<XpulumiConfig> {
        let starting_dir = match self.starting_dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| {
                Error::file_system(".", "determine current directory", e)
            })?,
        };
        let env = self.env.unwrap_or_else(EnvironmentVariables::from_os);

        // An explicit path beats the environment variable; an empty
        // XPULUMI_CONFIG is treated as unset.
        let explicit = self.config_path.or_else(|| {
            env.get(XPULUMI_CONFIG_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });

        let config_file =
            locate_config_file(&starting_dir, explicit.as_deref(), self.scan_parent_dirs)?;
        debug!(config_file = %config_file.display(), "loading xpulumi config");

        let format = ConfigFormat::for_path(&config_file);
        let text = std::fs::read_to_string(&config_file)
            .map_err(|e| Error::file_system(&config_file, "read", e))?;
        let data = if text.trim().is_empty() {
            ConfigFileData::default()
        } else {
            ConfigFileData::parse(&text, format).with_context(|| {
                format!("invalid config file {}", config_file.display())
            })?
        };

        Self::resolve(config_file, format, data)
    }

    /// Turn raw file contents into fully absolute paths.
    ///
    /// `xpulumi_dir` is relative to the config file's directory and defaults
    /// to that directory itself; `project_root_dir` is relative to
    /// `xpulumi_dir` and defaults to its parent; `pulumi_home` is relative to
    /// `xpulumi_dir` and defaults to `.pulumi` beneath it.
    fn resolve(
        config_file: PathBuf,
        format: ConfigFormat,
        data: ConfigFileData,
    ) -> Result<XpulumiConfig> {
        let config_dir = config_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let xpulumi_dir = abs_join(
            &config_dir,
            &expand_user(data.xpulumi_dir.as_deref().unwrap_or(".")),
        );
        let project_root_dir = abs_join(
            &xpulumi_dir,
            &expand_user(data.project_root_dir.as_deref().unwrap_or("..")),
        );
        let pulumi_home = abs_join(
            &xpulumi_dir,
            &expand_user(data.pulumi_home.as_deref().unwrap_or(".pulumi")),
        );

        Ok(XpulumiConfig {
            config_file,
            format,
            xpulumi_dir,
            project_root_dir,
            pulumi_home,
            default_backend_name: data.default_backend,
            default_stack_name: data.default_stack,
            pulumi_version: data.pulumi_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn defaults_resolve_relative_to_config_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(&root.join("repo/xpulumi.d/xpulumi.json"), "{}");

        let cfg = ConfigLoader::new()
            .starting_dir(root.join("repo/xpulumi.d"))
            .env(EnvironmentVariables::new())
            .load()
            .await
            .unwrap();

        assert_eq!(cfg.xpulumi_dir, root.join("repo/xpulumi.d"));
        assert_eq!(cfg.project_root_dir, root.join("repo"));
        assert_eq!(cfg.pulumi_home, root.join("repo/xpulumi.d/.pulumi"));
        assert_eq!(cfg.default_backend_name, None);
    }

    #[tokio::test]
    async fn explicit_fields_override_defaults() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(
            &root.join("repo/xpulumi.yaml"),
            "xpulumi_dir: infra\nproject_root_dir: .\npulumi_home: /opt/pulumi\ndefault_backend: local\ndefault_stack: dev\n",
        );

        let cfg = ConfigLoader::new()
            .starting_dir(root.join("repo"))
            .env(EnvironmentVariables::new())
            .load()
            .await
            .unwrap();

        assert_eq!(cfg.format, ConfigFormat::Yaml);
        assert_eq!(cfg.xpulumi_dir, root.join("repo/infra"));
        assert_eq!(cfg.project_root_dir, root.join("repo/infra"));
        assert_eq!(cfg.pulumi_home, PathBuf::from("/opt/pulumi"));
        assert_eq!(cfg.default_backend_name.as_deref(), Some("local"));
        assert_eq!(cfg.default_stack_name.as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn discovery_walks_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(&root.join("repo/xpulumi.d/xpulumi.json"), "{}");
        std::fs::create_dir_all(root.join("repo/src/deep")).unwrap();

        let cfg = ConfigLoader::new()
            .starting_dir(root.join("repo/src/deep"))
            .env(EnvironmentVariables::new())
            .load()
            .await
            .unwrap();

        assert_eq!(cfg.config_file, root.join("repo/xpulumi.d/xpulumi.json"));
        assert_eq!(cfg.project_root_dir, root.join("repo"));
    }

    #[tokio::test]
    async fn env_var_supplies_config_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(&root.join("elsewhere/xpulumi.json"), "{}");
        std::fs::create_dir_all(root.join("work")).unwrap();

        let env: EnvironmentVariables = [(
            XPULUMI_CONFIG_ENV_VAR.to_string(),
            root.join("elsewhere/xpulumi.json").display().to_string(),
        )]
        .into_iter()
        .collect();

        let cfg = ConfigLoader::new()
            .starting_dir(root.join("work"))
            .env(env)
            .load()
            .await
            .unwrap();
        assert_eq!(cfg.config_file, root.join("elsewhere/xpulumi.json"));
    }

    #[tokio::test]
    async fn empty_env_var_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        write(&root.join("repo/xpulumi.json"), "{}");

        let env: EnvironmentVariables =
            [(XPULUMI_CONFIG_ENV_VAR.to_string(), String::new())]
                .into_iter()
                .collect();

        let cfg = ConfigLoader::new()
            .starting_dir(root.join("repo"))
            .env(env)
            .load()
            .await
            .unwrap();
        assert_eq!(cfg.config_file, root.join("repo/xpulumi.json"));
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = ConfigLoader::new()
            .starting_dir(tmp.path())
            .env(EnvironmentVariables::new())
            .scan_parent_dirs(false)
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no xpulumi configuration found"));
    }
}
