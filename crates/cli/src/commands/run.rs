use xpulumi_core::{Error, Result};
use xpulumi_wrapper::PulumiWrapper;

use crate::globals::GlobalArgs;

/// Run an arbitrary command with the environment a wrapped `pulumi` would
/// see: backend URL, stack selection, passphrase, and PATH filled in. With
/// `--raw-env` the caller's environment passes through untouched.
///
/// Does not return on success; the child's exit code becomes ours.
pub async fn execute(globals: GlobalArgs, raw_env: bool, mut command: Vec<String>) -> Result<()> {
    if command.is_empty() {
        command.push("bash".to_string());
    }
    if command[0].starts_with('-') {
        return Err(Error::configuration(format!(
            "unrecognized command option '{}'",
            command[0]
        )));
    }

    let ctx = globals.context().await?;
    let env = if raw_env {
        ctx.env().clone()
    } else {
        PulumiWrapper::new(ctx.clone(), Vec::new())
            .await?
            .environment(None)
            .await?
    };

    let status = tokio::process::Command::new(&command[0])
        .args(&command[1..])
        .env_clear()
        .envs(env.as_map())
        .current_dir(ctx.cwd())
        .status()
        .await
        .map_err(|e| {
            Error::command_execution(
                command[0].as_str(),
                command[1..].to_vec(),
                format!("failed to spawn: {e}"),
                None,
            )
        })?;
    std::process::exit(status.code().unwrap_or(1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xpulumi_core::EnvironmentVariables;

    use crate::globals::ColorMode;

    #[tokio::test]
    async fn rejects_leading_option_arguments() {
        let tmp = TempDir::new().unwrap();
        let globals = GlobalArgs {
            cwd: tmp.path().to_path_buf(),
            config_path: None,
            compact: false,
            color: ColorMode::Never,
            env: EnvironmentVariables::new(),
        };
        let err = execute(globals, false, vec!["-lart".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unrecognized command option"));
    }
}
