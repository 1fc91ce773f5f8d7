use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use tracing::info;
use xpulumi_backend::{
    file_url_to_pathname, list_backend_names, url_scheme, BackendConfig, BackendOptions, Context,
};
use xpulumi_core::constants::PULUMI_STANDARD_BACKEND;
use xpulumi_core::fsutil::write_atomic_string;
use xpulumi_core::paths::relative_to;
use xpulumi_core::{Error, Result};

use crate::globals::GlobalArgs;
use crate::output::render_table;

/// Everything a newly created file-backend state directory should keep out
/// of version control.
const STATE_GITIGNORE: &str = "*\n!.gitignore\n";

#[derive(Subcommand)]
pub enum BackendCommands {
    /// Declare a new named backend
    Create {
        /// Name of the backend
        name: String,

        /// Backend URI (defaults to file://./state)
        #[arg(long, value_name = "URI")]
        uri: Option<String>,

        /// Default organization for projects on this backend
        #[arg(long, value_name = "ORG")]
        organization: Option<String>,

        /// The URI already identifies the organization
        #[arg(long)]
        includes_organization: bool,

        /// The URI already identifies the project
        #[arg(long)]
        includes_project: bool,
    },

    /// Make a backend the default for later commands
    Select {
        /// Name of the backend
        name: String,
    },

    /// List declared backends
    Ls,
}

impl BackendCommands {
    pub async fn execute(self, globals: GlobalArgs) -> Result<()> {
        let ctx = globals.context().await?;
        match self {
            BackendCommands::Create {
                name,
                uri,
                organization,
                includes_organization,
                includes_project,
            } => {
                create_backend(
                    &ctx,
                    &name,
                    uri,
                    organization,
                    includes_organization,
                    includes_project,
                )
                .await
            }
            BackendCommands::Select { name } => select_backend(&ctx, &name).await,
            BackendCommands::Ls => list_backends(&ctx).await,
        }
    }
}

/// Write `backend/<name>/backend.json`. A `file:` URI also gets its state
/// directory created, with a `.gitignore` keeping the state out of version
/// control; remote URIs are recorded as given.
pub(crate) async fn create_backend(
    ctx: &Arc<Context>,
    name: &str,
    uri: Option<String>,
    organization: Option<String>,
    includes_organization: bool,
    includes_project: bool,
) -> Result<()> {
    let backend_dir = ctx.config().backend_dir(name);
    if BackendConfig::path_in(&backend_dir).is_file() {
        return Err(Error::backend(name, "backend already exists"));
    }

    // Shorthand forms of "a local file backend" all mean the same thing.
    let uri = match uri.as_deref() {
        None | Some("file") | Some("file:") | Some("file://") => "file://./state".to_string(),
        Some(other) => other.to_string(),
    };
    let scheme = url_scheme(&uri)
        .ok_or_else(|| Error::url(uri.as_str(), "backend URI has no scheme"))?;
    let stored_uri = match scheme.as_str() {
        "file" => create_file_state(name, &backend_dir, &uri)?,
        "s3" | "http" | "https" => {
            std::fs::create_dir_all(&backend_dir)
                .map_err(|e| Error::file_system(&backend_dir, "create directory", e))?;
            uri.clone()
        }
        other => {
            return Err(Error::backend(
                name,
                format!("cannot create a backend with scheme '{other}'"),
            ))
        }
    };

    let config = BackendConfig {
        name: Some(name.to_string()),
        uri: Some(stored_uri),
        options: BackendOptions {
            includes_organization,
            includes_project,
            default_organization: organization,
            ..BackendOptions::default()
        },
    };
    config.save(&backend_dir)?;
    info!(backend = name, dir = %backend_dir.display(), "declared backend");
    Ok(())
}

/// Resolve a `file:` URI against the backend directory, create the state
/// directory, and return the URI re-expressed relative to the backend
/// directory so the declaration survives a repository move.
fn create_file_state(name: &str, backend_dir: &Path, uri: &str) -> Result<String> {
    let state_dir = file_url_to_pathname(uri, backend_dir, true)?;
    let rel = relative_to(&state_dir, backend_dir);
    let stored = format!("file://./{}", rel.to_string_lossy().replace('\\', "/"));

    if state_dir.exists() {
        return Err(Error::backend(
            name,
            format!("state directory '{}' already exists", state_dir.display()),
        ));
    }
    if let Some(parent) = state_dir.parent() {
        if parent != backend_dir && !parent.is_dir() {
            return Err(Error::backend(
                name,
                format!("parent directory of file backend '{uri}' does not exist"),
            ));
        }
    }
    std::fs::create_dir_all(backend_dir)
        .map_err(|e| Error::file_system(backend_dir, "create directory", e))?;
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| Error::file_system(&state_dir, "create directory", e))?;
    write_atomic_string(&state_dir.join(".gitignore"), STATE_GITIGNORE)?;
    Ok(stored)
}

async fn select_backend(ctx: &Arc<Context>, name: &str) -> Result<()> {
    let known = list_backend_names(ctx.config()).await?;
    if !known.iter().any(|n| n == name) {
        let listing = if known.is_empty() {
            "none are declared yet".to_string()
        } else {
            format!("known backends: {}", known.join(", "))
        };
        return Err(Error::backend(name, format!("no such backend; {listing}")));
    }
    ctx.config().set_default_backend(name)?;
    info!(backend = name, "selected default backend");
    Ok(())
}

async fn list_backends(ctx: &Arc<Context>) -> Result<()> {
    let default = ctx.config().default_backend_name.clone();
    let mut rows = Vec::new();
    for name in list_backend_names(ctx.config()).await? {
        let config = BackendConfig::load(&ctx.config().backend_dir(&name)).await?;
        let uri = config
            .uri
            .unwrap_or_else(|| PULUMI_STANDARD_BACKEND.to_string());
        let scheme = url_scheme(&uri).unwrap_or_else(|| "?".to_string());
        let marker = if default.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            ""
        };
        rows.push(vec![format!("{name}{marker}"), uri, scheme]);
    }
    print!("{}", render_table(&["NAME", "URI", "SCHEME"], &rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xpulumi_config::{ConfigFormat, XpulumiConfig};
    use xpulumi_core::EnvironmentVariables;

    fn test_ctx(root: &Path) -> Arc<Context> {
        let config = Arc::new(XpulumiConfig {
            config_file: root.join("xpulumi.d/xpulumi.json"),
            format: ConfigFormat::Json,
            xpulumi_dir: root.join("xpulumi.d"),
            project_root_dir: root.to_path_buf(),
            pulumi_home: root.join("xpulumi.d/.pulumi"),
            default_backend_name: None,
            default_stack_name: None,
            pulumi_version: None,
        });
        Arc::new(Context::new(
            config,
            root.to_path_buf(),
            EnvironmentVariables::new(),
        ))
    }

    #[tokio::test]
    async fn default_create_declares_a_local_file_backend() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_ctx(tmp.path());

        create_backend(&ctx, "local", None, None, false, false)
            .await
            .unwrap();

        let backend_dir = tmp.path().join("xpulumi.d/backend/local");
        let config = BackendConfig::load(&backend_dir).await.unwrap();
        assert_eq!(config.name.as_deref(), Some("local"));
        assert_eq!(config.uri.as_deref(), Some("file://./state"));
        let gitignore =
            std::fs::read_to_string(backend_dir.join("state/.gitignore")).unwrap();
        assert_eq!(gitignore, STATE_GITIGNORE);
    }

    #[tokio::test]
    async fn duplicate_creation_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_ctx(tmp.path());

        create_backend(&ctx, "local", None, None, false, false)
            .await
            .unwrap();
        let err = create_backend(&ctx, "local", None, None, false, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn state_outside_the_backend_dir_keeps_a_relative_uri() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_ctx(tmp.path());
        std::fs::create_dir_all(tmp.path().join("xpulumi.d/shared")).unwrap();

        create_backend(
            &ctx,
            "shared",
            Some("file://../../shared/state".to_string()),
            None,
            false,
            false,
        )
        .await
        .unwrap();

        let backend_dir = tmp.path().join("xpulumi.d/backend/shared");
        let config = BackendConfig::load(&backend_dir).await.unwrap();
        assert_eq!(config.uri.as_deref(), Some("file://./../../shared/state"));
        assert!(tmp.path().join("xpulumi.d/shared/state/.gitignore").is_file());
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_ctx(tmp.path());

        let err = create_backend(
            &ctx,
            "odd",
            Some("gs://bucket/prefix".to_string()),
            None,
            false,
            false,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("scheme 'gs'"));
        assert!(!tmp.path().join("xpulumi.d/backend/odd").exists());
    }

    #[tokio::test]
    async fn selecting_an_unknown_backend_lists_the_known_ones() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_ctx(tmp.path());
        std::fs::create_dir_all(tmp.path().join("xpulumi.d")).unwrap();
        std::fs::write(&ctx.config().config_file, "{}\n").unwrap();

        create_backend(&ctx, "local", None, None, false, false)
            .await
            .unwrap();
        let err = select_backend(&ctx, "prod").await.unwrap_err();
        assert!(err.to_string().contains("known backends: local"));

        select_backend(&ctx, "local").await.unwrap();
        let rewritten = std::fs::read_to_string(&ctx.config().config_file).unwrap();
        assert!(rewritten.contains(r#""default_backend": "local""#));
    }
}
