use std::sync::Arc;

use tracing::info;
use xpulumi_backend::{BackendConfig, Context};
use xpulumi_config::{ConfigFileData, ConfigFormat, ConfigLoader};
use xpulumi_core::constants::XPULUMI_INFRA_DIRNAME;
use xpulumi_core::fsutil::write_atomic_string;
use xpulumi_core::{Error, Result};

use crate::globals::GlobalArgs;

/// Scaffold `xpulumi.d/` in the working directory: a config file naming
/// "local" as the default backend, plus the backend itself with file state
/// under `xpulumi.d/backend/local/state`.
pub async fn execute(
    globals: GlobalArgs,
    backend_uri: Option<String>,
    stack: Option<String>,
    force: bool,
) -> Result<()> {
    let infra_dir = globals.cwd.join(XPULUMI_INFRA_DIRNAME);
    let config_path = infra_dir.join("xpulumi.json");
    if config_path.is_file() && !force {
        return Err(Error::configuration(format!(
            "'{}' already exists; pass --force to rewrite it",
            config_path.display()
        )));
    }

    std::fs::create_dir_all(&infra_dir)
        .map_err(|e| Error::file_system(&infra_dir, "create directory", e))?;
    let data = ConfigFileData {
        default_backend: Some("local".to_string()),
        default_stack: stack,
        ..ConfigFileData::default()
    };
    write_atomic_string(&config_path, &data.to_string(ConfigFormat::Json)?)?;
    info!(path = %config_path.display(), "wrote configuration");

    // Reload through the just-written file so backend paths resolve exactly
    // as later commands will see them.
    let config = Arc::new(
        ConfigLoader::new()
            .starting_dir(&globals.cwd)
            .config_path(&config_path)
            .env(globals.env.clone())
            .load()
            .await?,
    );
    let ctx = Arc::new(Context::new(config, globals.cwd.clone(), globals.env.clone()));

    if BackendConfig::path_in(&ctx.config().backend_dir("local")).is_file() {
        info!("backend 'local' already declared, leaving it alone");
        return Ok(());
    }
    super::backend::create_backend(&ctx, "local", backend_uri, None, false, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xpulumi_core::EnvironmentVariables;

    use crate::globals::ColorMode;

    fn globals_at(root: &std::path::Path) -> GlobalArgs {
        GlobalArgs {
            cwd: root.to_path_buf(),
            config_path: None,
            compact: false,
            color: ColorMode::Never,
            env: EnvironmentVariables::new(),
        }
    }

    #[tokio::test]
    async fn scaffolds_config_and_local_backend() {
        let tmp = TempDir::new().unwrap();
        execute(globals_at(tmp.path()), None, Some("dev".to_string()), false)
            .await
            .unwrap();

        let infra = tmp.path().join("xpulumi.d");
        let config_text = std::fs::read_to_string(infra.join("xpulumi.json")).unwrap();
        assert!(config_text.contains(r#""default_backend": "local""#));
        assert!(config_text.contains(r#""default_stack": "dev""#));

        let backend_dir = infra.join("backend/local");
        let backend: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(backend_dir.join("backend.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(backend["uri"], "file://./state");
        assert!(backend_dir.join("state/.gitignore").is_file());
    }

    #[tokio::test]
    async fn refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        execute(globals_at(tmp.path()), None, None, false)
            .await
            .unwrap();
        let err = execute(globals_at(tmp.path()), None, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--force"));
    }
}
