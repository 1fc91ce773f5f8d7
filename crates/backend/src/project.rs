//! Projects: the directories under `<infra>/project/` that pair a Pulumi
//! program with a named backend.
//!
//! A project's `xpulumi-project.json` names its backend and, optionally, the
//! organization, the Pulumi project name, and other xpulumi stacks it
//! depends on. The heavy lifting of running `pulumi` with the right
//! environment happens here: every wrapped invocation gets its backend URL,
//! home directory, and secrets passphrase derived rather than hand-set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use xpulumi_config::XpulumiConfig;
use xpulumi_core::constants::{
    PROJECT_CONFIG_FILENAME, PULUMI_ACCESS_TOKEN_ENV_VAR, PULUMI_BACKEND_URL_ENV_VAR,
    PULUMI_CONFIG_PASSPHRASE_ENV_VAR, PULUMI_HOME_ENV_VAR, XPULUMI_RAW_PULUMI_ENV_VAR,
};
use xpulumi_core::{fsutil, EnvironmentVariables, Error, Result, ResultExt};

use crate::backend::Backend;
use crate::context::Context;
use crate::metadata::StackMetadata;

/// On-disk shape of `xpulumi-project.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Named backend holding this project's stack state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Overrides the `name:` in `Pulumi.yaml` for backend URL purposes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulumi_project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Deployed by something other than xpulumi; `up`/`destroy` keep off.
    pub externally_managed: bool,
    /// Other stacks this project's stacks build on. Entries are either
    /// `<project>` (same stack name) or `<project>:<stack>`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ProjectConfig {
    #[must_use]
    pub fn json_path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_FILENAME)
    }

    fn yaml_path_in(project_dir: &Path) -> PathBuf {
        Self::json_path_in(project_dir).with_extension("yaml")
    }

    /// Read the project config, preferring JSON over YAML when both exist.
    pub async fn load(project_dir: &Path) -> Result<Option<Self>> {
        let json_path = Self::json_path_in(project_dir);
        match tokio::fs::read_to_string(&json_path).await {
            Ok(text) => {
                return serde_json::from_str(&text)
                    .map(Some)
                    .with_context(|| format!("invalid project config '{}'", json_path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_system(&json_path, "read", e)),
        }
        let yaml_path = Self::yaml_path_in(project_dir);
        match tokio::fs::read_to_string(&yaml_path).await {
            Ok(text) => serde_yaml::from_str(&text)
                .map(Some)
                .with_context(|| format!("invalid project config '{}'", yaml_path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::file_system(&yaml_path, "read", e)),
        }
    }

    /// Write `xpulumi-project.json` atomically, pretty-printed with sorted
    /// keys.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let value = serde_json::to_value(self)?;
        let text = format!("{}\n", serde_json::to_string_pretty(&value)?);
        fsutil::write_atomic_string(&Self::json_path_in(project_dir), &text)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PulumiYamlDoc {
    name: Option<String>,
}

/// A loaded project, bound to its backend.
pub struct Project {
    ctx: Arc<Context>,
    name: String,
    project_dir: PathBuf,
    cfg: ProjectConfig,
    backend: Backend,
    pulumi_project_name: String,
    has_pulumi_yaml: bool,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("project_dir", &self.project_dir)
            .field("backend", &self.backend.display_name())
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Load a project by name, or infer the name from the context's working
    /// directory when it sits inside `<infra>/project/<name>/`.
    pub async fn load(ctx: Arc<Context>, name: Option<&str>) -> Result<Arc<Self>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => ctx
                .config()
                .project_name_for_dir(ctx.cwd())
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "'{}' is not inside an xpulumi project directory; name the project explicitly",
                        ctx.cwd().display()
                    ))
                })?,
        };
        let project_dir = ctx.config().project_dir(&name);
        let cfg = ProjectConfig::load(&project_dir).await?.ok_or_else(|| {
            Error::project(
                &name,
                format!(
                    "no project definition at '{}'; create one with 'xpulumi project create'",
                    project_dir.display()
                ),
            )
        })?;

        let backend_name = cfg
            .backend
            .clone()
            .or_else(|| ctx.config().default_backend_name.clone())
            .ok_or_else(|| {
                Error::project(&name, "no backend named in the project config or as a default")
            })?;
        let backend = Backend::from_name(ctx.clone(), &backend_name).await?;

        let yaml_name = read_pulumi_yaml_name(&project_dir).await?;
        let has_pulumi_yaml = yaml_name.is_some();
        let pulumi_project_name = cfg
            .pulumi_project_name
            .clone()
            .or_else(|| yaml_name.flatten())
            .unwrap_or_else(|| name.clone());

        debug!(project = %name, backend = %backend.display_name(), "loaded project");
        Ok(Arc::new(Self {
            ctx,
            name,
            project_dir,
            cfg,
            backend,
            pulumi_project_name,
            has_pulumi_yaml,
        }))
    }

    /// Like [`Project::load`], but quietly absent when no name was given
    /// and the working directory is outside any project, or when the named
    /// project has no definition on disk.
    pub async fn load_optional(
        ctx: Arc<Context>,
        name: Option<&str>,
    ) -> Result<Option<Arc<Self>>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => match ctx.config().project_name_for_dir(ctx.cwd()) {
                Some(name) => name,
                None => return Ok(None),
            },
        };
        if ProjectConfig::load(&ctx.config().project_dir(&name))
            .await?
            .is_none()
        {
            return Ok(None);
        }
        Ok(Some(Self::load(ctx, Some(&name)).await?))
    }

    #[must_use]
    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    #[must_use]
    pub fn organization(&self) -> Option<&str> {
        self.cfg.organization.as_deref()
    }

    /// Name Pulumi itself knows this project by.
    #[must_use]
    pub fn pulumi_project_name(&self) -> &str {
        &self.pulumi_project_name
    }

    #[must_use]
    pub fn externally_managed(&self) -> bool {
        self.cfg.externally_managed
    }

    /// Declared dependencies, unparsed.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.cfg.dependencies
    }

    /// Whether `up`/`destroy` make sense here: a Pulumi program exists and
    /// nothing else owns its deployments.
    #[must_use]
    pub fn is_deployable(&self) -> bool {
        self.has_pulumi_yaml && !self.cfg.externally_managed
    }

    /// Default stack for this context, as chosen with `xpulumi stack select`.
    #[must_use]
    pub fn default_stack_name(&self) -> Option<&str> {
        self.ctx.config().default_stack_name.as_deref()
    }

    pub fn get_project_backend_url(&self) -> Result<String> {
        self.backend
            .get_project_backend_url(self.organization(), &self.pulumi_project_name)
    }

    pub fn get_stack_backend_url(&self, stack: &str) -> Result<String> {
        self.backend
            .get_stack_backend_url(self.organization(), &self.pulumi_project_name, stack)
    }

    pub async fn export_stack(
        &self,
        stack: &str,
        decrypt_secrets: bool,
    ) -> Result<crate::state::StackExport> {
        self.backend
            .export_stack(
                self.organization(),
                &self.pulumi_project_name,
                stack,
                decrypt_secrets,
            )
            .await
    }

    pub async fn get_stack_outputs(
        &self,
        stack: &str,
        decrypt_secrets: bool,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.backend
            .get_stack_outputs(
                self.organization(),
                &self.pulumi_project_name,
                stack,
                decrypt_secrets,
            )
            .await
    }

    pub async fn stack_is_inited(&self, stack: &str) -> Result<bool> {
        self.backend
            .stack_is_inited(self.organization(), &self.pulumi_project_name, stack)
            .await
    }

    pub async fn stack_is_deployed(&self, stack: &str) -> Result<bool> {
        self.backend
            .stack_is_deployed(self.organization(), &self.pulumi_project_name, stack)
            .await
    }

    pub async fn list_stack_names(&self) -> Result<Vec<String>> {
        self.backend
            .list_stack_names(self.organization(), &self.pulumi_project_name)
            .await
    }

    pub async fn precreate_project_backend(&self) -> Result<()> {
        self.backend
            .precreate_project_backend(self.organization(), &self.pulumi_project_name)
            .await
    }

    /// Environment for running `pulumi` against this project.
    ///
    /// Starting from the context's environment: marks the invocation so the
    /// wrapper shim does not recurse, pins `PULUMI_HOME`, puts the wrapped
    /// CLI first on `PATH`, points `PULUMI_BACKEND_URL` at this project's
    /// slice of the backend, and supplies the secrets passphrase for
    /// DIY backends unless the caller already exported one.
    pub async fn pulumi_environment(&self, stack: Option<&str>) -> Result<EnvironmentVariables> {
        let mut env = self.ctx.env().clone();
        env.insert(XPULUMI_RAW_PULUMI_ENV_VAR, "1");
        env.insert(
            PULUMI_HOME_ENV_VAR,
            self.ctx.pulumi_home().display().to_string(),
        );
        env.prepend_path("PATH", &self.ctx.pulumi_bin_dir().display().to_string());

        if self.backend.is_service_backend() {
            env.insert(PULUMI_BACKEND_URL_ENV_VAR, self.backend.url());
            env.insert(
                PULUMI_ACCESS_TOKEN_ENV_VAR,
                self.backend.require_access_token()?,
            );
        } else {
            env.remove(PULUMI_BACKEND_URL_ENV_VAR);
            env.remove(PULUMI_ACCESS_TOKEN_ENV_VAR);
        }
        env.insert(PULUMI_BACKEND_URL_ENV_VAR, self.get_project_backend_url()?);

        let passphrase_already_set = self
            .ctx
            .env()
            .get(PULUMI_CONFIG_PASSPHRASE_ENV_VAR)
            .is_some();
        if !self.backend.is_service_backend() && !passphrase_already_set {
            match self
                .ctx
                .pulumi_secret_passphrase(
                    Some(self.backend.url()),
                    self.organization(),
                    Some(&self.pulumi_project_name),
                    stack,
                    None,
                )
                .await
            {
                Ok(passphrase) => {
                    env.insert(PULUMI_CONFIG_PASSPHRASE_ENV_VAR, passphrase);
                }
                // Not fatal here; pulumi prompts for a passphrase when an
                // operation actually needs one.
                Err(e) => debug!(error = %e, "no stored passphrase for this stack"),
            }
        }
        Ok(env)
    }

    /// Run `pulumi` in this project's directory with the derived
    /// environment, inheriting stdio. A failure carries the exit code.
    pub async fn call_pulumi(&self, args: &[String], stack: Option<&str>) -> Result<()> {
        let exe = self.ctx.pulumi_cli()?;
        let env = self.pulumi_environment(stack).await?;
        debug!(exe = %exe.display(), args = %args.join(" "), "invoking pulumi");
        let status = tokio::process::Command::new(&exe)
            .args(args)
            .env_clear()
            .envs(env.as_map())
            .current_dir(&self.project_dir)
            .status()
            .await
            .map_err(|e| {
                Error::command_execution(
                    exe.display().to_string(),
                    args.to_vec(),
                    format!("failed to spawn: {e}"),
                    None,
                )
            })?;
        if !status.success() {
            return Err(Error::command_execution(
                exe.display().to_string(),
                args.to_vec(),
                "pulumi exited with failure",
                status.code(),
            ));
        }
        Ok(())
    }

    /// Create a stack in this project's backend with `pulumi stack init`,
    /// doing nothing when it already exists.
    pub async fn init_stack(&self, stack: &str) -> Result<()> {
        self.precreate_project_backend().await?;
        if self.stack_is_inited(stack).await? {
            return Ok(());
        }
        self.call_pulumi(
            &["stack".to_string(), "init".to_string(), stack.to_string()],
            Some(stack),
        )
        .await
    }

    /// Metadata rows for every stack this project has in its backend.
    pub async fn stacks_metadata(&self) -> Result<Vec<StackMetadata>> {
        let current = self.default_stack_name().map(str::to_string);
        let names = self.list_stack_names().await?;
        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            let is_current = current.as_deref() == Some(name.as_str());
            let row = match self.export_stack(&name, false).await {
                Ok(export) => StackMetadata::from_checkpoint(
                    &name,
                    is_current,
                    export.manifest_time(),
                    export.resource_count().map(|n| n as u64),
                ),
                Err(Error::StackNotDeployed { .. }) => {
                    StackMetadata::from_checkpoint(&name, is_current, None, None)
                }
                Err(e) => return Err(e),
            };
            rows.push(row);
        }
        Ok(rows)
    }
}

async fn read_pulumi_yaml_name(project_dir: &Path) -> Result<Option<Option<String>>> {
    let path = project_dir.join("Pulumi.yaml");
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            let doc: PulumiYamlDoc = serde_yaml::from_str(&text)
                .with_context(|| format!("invalid '{}'", path.display()))?;
            Ok(Some(doc.name))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::file_system(&path, "read", e)),
    }
}

/// Names of the projects defined under `<infra>/project/`, sorted.
pub async fn list_project_names(config: &XpulumiConfig) -> Result<Vec<String>> {
    let dir = config.project_infra_dir();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::file_system(&dir, "read", e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::file_system(&dir, "read", e))?
    {
        let project_dir = entry.path();
        if ProjectConfig::json_path_in(&project_dir).is_file()
            || ProjectConfig::json_path_in(&project_dir)
                .with_extension("yaml")
                .is_file()
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
