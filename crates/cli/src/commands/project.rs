use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use tracing::info;
use xpulumi_backend::{list_project_names, Backend, Context, ProjectConfig};
use xpulumi_core::fsutil::write_atomic_string;
use xpulumi_core::{Error, Result};

use crate::globals::GlobalArgs;
use crate::output::render_table;

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Declare a new project under xpulumi.d/project/
    Create {
        /// Name of the project
        name: String,

        /// Backend holding the project's stack state (defaults to the
        /// selected backend)
        #[arg(long, value_name = "NAME")]
        backend: Option<String>,

        /// Pulumi project name, when it has to differ from NAME
        #[arg(long, value_name = "NAME")]
        pulumi_project_name: Option<String>,

        /// Organization the project belongs to
        #[arg(long, value_name = "ORG")]
        organization: Option<String>,

        /// Pulumi runtime recorded in the scaffolded Pulumi.yaml
        #[arg(long, value_name = "RUNTIME", default_value = "python")]
        runtime: String,
    },

    /// List declared projects
    Ls,
}

impl ProjectCommands {
    pub async fn execute(self, globals: GlobalArgs) -> Result<()> {
        let ctx = globals.context().await?;
        match self {
            ProjectCommands::Create {
                name,
                backend,
                pulumi_project_name,
                organization,
                runtime,
            } => {
                create_project(
                    &ctx,
                    &name,
                    backend,
                    pulumi_project_name,
                    organization,
                    &runtime,
                )
                .await
            }
            ProjectCommands::Ls => list_projects(&ctx).await,
        }
    }
}

/// Scaffold `project/<name>/` with an `xpulumi-project.json` and a minimal
/// `Pulumi.yaml`.
async fn create_project(
    ctx: &Arc<Context>,
    name: &str,
    backend: Option<String>,
    pulumi_project_name: Option<String>,
    organization: Option<String>,
    runtime: &str,
) -> Result<()> {
    let project_dir = ctx.config().project_dir(name);
    if ProjectConfig::load(&project_dir).await?.is_some() {
        return Err(Error::project(name, "project already exists"));
    }

    let backend_name = backend
        .or_else(|| ctx.config().default_backend_name.clone())
        .ok_or_else(|| {
            Error::project(name, "no backend named and no default backend is selected")
        })?;
    // Resolving the backend up front catches a missing declaration before
    // anything is written.
    Backend::from_name(ctx.clone(), &backend_name).await?;

    std::fs::create_dir_all(&project_dir)
        .map_err(|e| Error::file_system(&project_dir, "create directory", e))?;
    let pulumi_name = pulumi_project_name.as_deref().unwrap_or(name).to_string();
    let config = ProjectConfig {
        name: Some(name.to_string()),
        backend: Some(backend_name),
        pulumi_project_name,
        organization,
        ..ProjectConfig::default()
    };
    config.save(&project_dir)?;
    write_atomic_string(
        &project_dir.join("Pulumi.yaml"),
        &format!("name: {pulumi_name}\nruntime: {runtime}\n"),
    )?;
    info!(project = name, dir = %project_dir.display(), "declared project");
    Ok(())
}

async fn list_projects(ctx: &Arc<Context>) -> Result<()> {
    let default_backend = ctx.config().default_backend_name.clone();
    let mut rows = Vec::new();
    for name in list_project_names(ctx.config()).await? {
        let project_dir = ctx.config().project_dir(&name);
        let config = ProjectConfig::load(&project_dir).await?.unwrap_or_default();
        let backend = config
            .backend
            .or_else(|| default_backend.clone())
            .unwrap_or_else(|| "-".to_string());
        let pulumi_name = match config.pulumi_project_name {
            Some(explicit) => explicit,
            None => pulumi_yaml_name(&project_dir)
                .await
                .unwrap_or_else(|| name.clone()),
        };
        let organization = config.organization.unwrap_or_else(|| "-".to_string());
        rows.push(vec![name, backend, pulumi_name, organization]);
    }
    print!(
        "{}",
        render_table(&["NAME", "BACKEND", "PULUMI PROJECT", "ORGANIZATION"], &rows)
    );
    Ok(())
}

/// `name:` from a project's `Pulumi.yaml`, if the file and key exist.
async fn pulumi_yaml_name(project_dir: &Path) -> Option<String> {
    let text = tokio::fs::read_to_string(project_dir.join("Pulumi.yaml"))
        .await
        .ok()?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    doc.get("name")?.as_str().map(str::to_string)
}
