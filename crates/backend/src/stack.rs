//! A single stack of a project, with access to its local config file.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use xpulumi_core::{Error, Result, ResultExt};

use crate::context::Context;
use crate::project::Project;
use crate::state::StackExport;

/// The secrets-related keys of `Pulumi.<stack>.yaml`. Everything else in
/// the file belongs to Pulumi and is left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackConfigFile {
    #[serde(default)]
    pub secretsprovider: Option<String>,
    #[serde(default)]
    pub encryptionsalt: Option<String>,
}

/// A named stack bound to its loaded project.
#[derive(Debug)]
pub struct Stack {
    project: Arc<Project>,
    name: String,
}

impl Stack {
    #[must_use]
    pub fn new(project: Arc<Project>, name: impl Into<String>) -> Self {
        Self {
            project,
            name: name.into(),
        }
    }

    /// Load a stack, defaulting the project from the working directory and
    /// the stack name from the selected default.
    pub async fn load(
        ctx: Arc<Context>,
        project_name: Option<&str>,
        stack_name: Option<&str>,
    ) -> Result<Self> {
        let project = Project::load(ctx, project_name).await?;
        let name = stack_name
            .map(str::to_string)
            .or_else(|| project.default_stack_name().map(str::to_string))
            .ok_or_else(|| {
                Error::configuration(
                    "no stack selected; pass --stack or run 'xpulumi stack select'",
                )
            })?;
        Ok(Self::new(project, name))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    /// `<project>:<stack>`, the form dependency declarations use.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.project.name(), self.name)
    }

    /// Path of this stack's `Pulumi.<stack>.yaml` in the project directory.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.project
            .project_dir()
            .join(format!("Pulumi.{}.yaml", self.name))
    }

    /// Parse the stack config file, or `None` when the stack has never been
    /// initialized locally.
    pub async fn stack_config(&self) -> Result<Option<StackConfigFile>> {
        let path = self.config_file_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_yaml::from_str(&text)
                .map(Some)
                .with_context(|| format!("invalid stack config '{}'", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::file_system(&path, "read", e)),
        }
    }

    /// The passphrase provider's salt state recorded in the stack config.
    pub async fn encryption_salt(&self) -> Result<Option<String>> {
        Ok(self
            .stack_config()
            .await?
            .and_then(|cfg| cfg.encryptionsalt))
    }

    /// `secretsprovider:` from the stack config, absent meaning the
    /// backend's default provider.
    pub async fn secrets_provider(&self) -> Result<Option<String>> {
        Ok(self
            .stack_config()
            .await?
            .and_then(|cfg| cfg.secretsprovider))
    }

    pub async fn is_inited(&self) -> Result<bool> {
        self.project.stack_is_inited(&self.name).await
    }

    pub async fn is_deployed(&self) -> Result<bool> {
        self.project.stack_is_deployed(&self.name).await
    }

    pub async fn export(&self, decrypt_secrets: bool) -> Result<StackExport> {
        self.project.export_stack(&self.name, decrypt_secrets).await
    }

    pub async fn outputs(
        &self,
        decrypt_secrets: bool,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.project
            .get_stack_outputs(&self.name, decrypt_secrets)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendConfig, BackendOptions};
    use crate::project::ProjectConfig;
    use std::path::Path;
    use tempfile::TempDir;
    use xpulumi_config::{ConfigFormat, XpulumiConfig};
    use xpulumi_core::EnvironmentVariables;

    fn test_ctx(root: &Path, default_stack: Option<&str>) -> Arc<Context> {
        let config = Arc::new(XpulumiConfig {
            config_file: root.join("xpulumi.d/xpulumi.json"),
            format: ConfigFormat::Json,
            xpulumi_dir: root.join("xpulumi.d"),
            project_root_dir: root.to_path_buf(),
            pulumi_home: root.join("xpulumi.d/.pulumi"),
            default_backend_name: None,
            default_stack_name: default_stack.map(str::to_string),
            pulumi_version: None,
        });
        Arc::new(Context::new(
            config,
            root.to_path_buf(),
            EnvironmentVariables::new(),
        ))
    }

    fn seed(root: &Path) {
        let backend_dir = root.join("xpulumi.d/backend/main");
        std::fs::create_dir_all(&backend_dir).unwrap();
        BackendConfig {
            name: Some("main".to_string()),
            uri: Some("file://./state".to_string()),
            options: BackendOptions::default(),
        }
        .save(&backend_dir)
        .unwrap();

        let project_dir = root.join("xpulumi.d/project/vpc");
        std::fs::create_dir_all(&project_dir).unwrap();
        ProjectConfig {
            backend: Some("main".to_string()),
            organization: Some("g".to_string()),
            ..ProjectConfig::default()
        }
        .save(&project_dir)
        .unwrap();
    }

    #[tokio::test]
    async fn default_stack_comes_from_config() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());

        let stack = Stack::load(test_ctx(tmp.path(), Some("dev")), Some("vpc"), None)
            .await
            .unwrap();
        assert_eq!(stack.name(), "dev");
        assert_eq!(stack.full_name(), "vpc:dev");

        let err = Stack::load(test_ctx(tmp.path(), None), Some("vpc"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("xpulumi stack select"));
    }

    #[tokio::test]
    async fn reads_secrets_keys_from_stack_config() {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        std::fs::write(
            tmp.path().join("xpulumi.d/project/vpc/Pulumi.dev.yaml"),
            "encryptionsalt: v1:ZHVtbXk=:v1:abc:def\nconfig:\n  aws:region: us-west-2\n",
        )
        .unwrap();

        let stack = Stack::load(test_ctx(tmp.path(), None), Some("vpc"), Some("dev"))
            .await
            .unwrap();
        assert_eq!(
            stack.encryption_salt().await.unwrap().as_deref(),
            Some("v1:ZHVtbXk=:v1:abc:def")
        );
        assert_eq!(stack.secrets_provider().await.unwrap(), None);

        let ghost = Stack::new(stack.project().clone(), "ghost");
        assert!(ghost.stack_config().await.unwrap().is_none());
    }
}
