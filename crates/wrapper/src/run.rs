//! The wrapped `pulumi` run.
//!
//! A [`PulumiWrapper`] takes the argument vector of the `pulumi` shim,
//! understands it with harvested help metadata, fills in the pieces xpulumi
//! manages (backend URL, home directory, passphrase, default stack), lets a
//! registered handler add project-aware behavior, and finally delegates to
//! the real CLI with the rewritten arguments. Raw escape hatches exist at
//! every level: `XPULUMI_RAW_PULUMI` in the environment disables the wrapper
//! outright, `--raw-pulumi` skips the rewriting, and `--raw-env` keeps the
//! caller's environment untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use xpulumi_backend::{Backend, Context, Project};
use xpulumi_core::constants::{
    PULUMI_ACCESS_TOKEN_ENV_VAR, PULUMI_BACKEND_URL_ENV_VAR, PULUMI_CONFIG_PASSPHRASE_ENV_VAR,
    PULUMI_HOME_ENV_VAR, XPULUMI_DEBUG_PULUMI_ENV_VAR, XPULUMI_RAW_PULUMI_ENV_VAR,
};
use xpulumi_core::{EnvironmentVariables, Error, Result};

use crate::handlers::{all_handlers, HandlerCx};
use crate::help::PulumiMetadata;
use crate::parse::ParsedCommand;

/// Subcommands whose first positional argument names the stack.
const STACK_ARG_CMDS: [&str; 4] = ["cancel", "stack init", "stack rm", "stack select"];

/// Subcommand prefixes that read or write backend state and so need the
/// project's backend area to exist first.
const PRECREATE_BACKEND_CMDS: [&str; 5] = ["state", "stack", "preview", "up", "destroy"];

fn wants_backend_precreate(full_subcmd: &str) -> bool {
    let padded = format!("{full_subcmd} ");
    PRECREATE_BACKEND_CMDS
        .iter()
        .any(|cmd| padded.starts_with(&format!("{cmd} ")))
}

/// One wrapped invocation of the `pulumi` CLI.
pub struct PulumiWrapper {
    ctx: Arc<Context>,
    project: Option<Arc<Project>>,
    backend: Option<Backend>,
    default_stack: Option<String>,
    argv: Vec<String>,
    raw_pulumi: bool,
    raw_env: bool,
    debug_cli: bool,
}

impl PulumiWrapper {
    /// Bind a wrapper to the current context, inferring the enclosing
    /// project from the working directory when there is one.
    pub async fn new(ctx: Arc<Context>, argv: Vec<String>) -> Result<Self> {
        let project = Project::load_optional(ctx.clone(), None).await?;
        let backend = if project.is_none() {
            match &ctx.config().default_backend_name {
                Some(name) => Some(Backend::from_name(ctx.clone(), name).await?),
                None => None,
            }
        } else {
            None
        };
        let default_stack = ctx.config().default_stack_name.clone();
        let raw_pulumi = ctx.env().is_truthy(XPULUMI_RAW_PULUMI_ENV_VAR);
        let debug_cli = ctx.env().is_truthy(XPULUMI_DEBUG_PULUMI_ENV_VAR);
        Ok(Self {
            ctx,
            project,
            backend,
            default_stack,
            argv,
            raw_pulumi,
            raw_env: raw_pulumi,
            debug_cli,
        })
    }

    /// Environment for the real CLI: the caller's environment with the
    /// xpulumi-managed variables filled in, unless `--raw-env` asked for it
    /// untouched. `xpulumi run` uses this to give arbitrary commands the
    /// same view a wrapped `pulumi` would get.
    pub async fn environment(&self, stack: Option<&str>) -> Result<EnvironmentVariables> {
        if self.raw_env {
            return Ok(self.ctx.env().clone());
        }
        if let Some(project) = &self.project {
            return project.pulumi_environment(stack).await;
        }
        let mut env = self.ctx.env().clone();
        env.insert(XPULUMI_RAW_PULUMI_ENV_VAR, "1");
        env.insert(
            PULUMI_HOME_ENV_VAR,
            self.ctx.pulumi_home().display().to_string(),
        );
        env.prepend_path("PATH", &self.ctx.pulumi_bin_dir().display().to_string());
        if let Some(backend) = &self.backend {
            if backend.is_service_backend() {
                env.insert(PULUMI_BACKEND_URL_ENV_VAR, backend.url());
                env.insert(PULUMI_ACCESS_TOKEN_ENV_VAR, backend.require_access_token()?);
            } else {
                env.remove(PULUMI_BACKEND_URL_ENV_VAR);
                env.remove(PULUMI_ACCESS_TOKEN_ENV_VAR);
                if env.get(PULUMI_CONFIG_PASSPHRASE_ENV_VAR).is_none() {
                    match self
                        .ctx
                        .pulumi_secret_passphrase(Some(backend.url()), None, None, stack, None)
                        .await
                    {
                        Ok(passphrase) => {
                            env.insert(PULUMI_CONFIG_PASSPHRASE_ENV_VAR, passphrase);
                        }
                        // Not fatal here; pulumi prompts for a passphrase
                        // when an operation actually needs one.
                        Err(e) => debug!(error = %e, "no stored passphrase available"),
                    }
                }
            }
        }
        Ok(env)
    }

    /// Run the wrapped command to completion, returning the exit code the
    /// shim should exit with.
    pub async fn run(mut self) -> Result<i32> {
        // XPULUMI_RAW_PULUMI in the environment disables the wrapper
        // entirely: untouched arguments, untouched environment.
        if self.raw_pulumi {
            let args = self.argv.clone();
            let env = self.ctx.env().clone();
            return self.exec(&args, &env).await;
        }

        let home = self.ctx.pulumi_home();
        let harvest_env = self.environment(None).await?;
        let mut metadata =
            tokio::task::spawn_blocking(move || PulumiMetadata::load(&home, &harvest_env, false))
                .await
                .map_err(|e| Error::configuration(format!("help metadata task failed: {e}")))??;

        metadata.root.add_option(
            &["--debug-cli"],
            "Dump the environment and final command line before running pulumi",
            true,
        );
        metadata.root.add_option(
            &["--raw-pulumi"],
            "Pass the command to pulumi without xpulumi rewriting",
            true,
        );
        metadata.root.add_option(
            &["--raw-env"],
            "Run pulumi with the caller's environment untouched",
            true,
        );
        let mut handlers = all_handlers();
        for handler in &handlers {
            handler.extend_metadata(&mut metadata);
        }

        let metadata = Arc::new(metadata);
        let mut parsed = ParsedCommand::parse(metadata, &self.argv)?;
        if parsed.pop_option_bool("--debug-cli") {
            self.debug_cli = true;
        }
        if parsed.pop_option_bool("--raw-env") {
            self.raw_env = true;
        }
        if parsed.pop_option_bool("--raw-pulumi") {
            self.raw_pulumi = true;
        }

        let full_subcmd = parsed.full_subcmd();
        let takes_stack_positional = STACK_ARG_CMDS.contains(&full_subcmd.as_str());
        let mut stack_name = if takes_stack_positional {
            parsed.positionals().first().cloned()
        } else if parsed.allows_option("--stack") {
            parsed.option_str("--stack").map(str::to_string)
        } else {
            None
        };
        if stack_name.is_none() {
            stack_name = self.default_stack.clone();
            if let Some(default) = stack_name.clone() {
                if !self.raw_pulumi && !takes_stack_positional && parsed.allows_option("--stack") {
                    parsed.set_option_str("--stack", default)?;
                }
            }
        }

        if !self.raw_pulumi && parsed.option_bool("--help") {
            let mut topic = parsed.topic().clone();
            topic.title.push_str(" (xpulumi wrapper)");
            print!("{}", topic.render_help());
            return Ok(0);
        }

        if !self.raw_pulumi && wants_backend_precreate(&full_subcmd) {
            if let Some(project) = &self.project {
                project.precreate_project_backend().await?;
            }
        }

        if !self.raw_pulumi {
            if let Some(handler) = handlers.iter_mut().find(|h| h.topic() == full_subcmd) {
                handler.tweak(&mut parsed)?;
                let mut cx = HandlerCx {
                    ctx: &self.ctx,
                    project: self.project.as_ref(),
                    parsed: &mut parsed,
                    stack_name: stack_name.clone(),
                };
                if let Some(code) = handler.run(&mut cx).await? {
                    return Ok(code);
                }
            }
        }

        let env = self.environment(stack_name.as_deref()).await?;
        let args = parsed.to_argv();
        self.exec(&args, &env).await
    }

    async fn exec(&self, args: &[String], env: &EnvironmentVariables) -> Result<i32> {
        let exe = self.ctx.pulumi_cli()?;
        if self.debug_cli {
            let sorted: BTreeMap<_, _> = env.as_map().iter().collect();
            eprintln!("pulumi env: {}", serde_json::to_string_pretty(&sorted)?);
            eprintln!("pulumi cmd: {} {}", exe.display(), args.join(" "));
        }
        debug!(exe = %exe.display(), args = %args.join(" "), "delegating to pulumi");
        let status = tokio::process::Command::new(&exe)
            .args(args)
            .env_clear()
            .envs(env.as_map())
            .current_dir(self.ctx.cwd())
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
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;
    use xpulumi_backend::{BackendConfig, BackendOptions, ProjectConfig};
    use xpulumi_config::{ConfigFormat, XpulumiConfig};

    const ROOT_HELP: &str = "\
Pulumi - Modern Infrastructure as Code

Usage:
  pulumi [command]

Available Commands:
  config      Manage configuration
  up          Create or update the resources in a stack

Flags:
  -C, --cwd string   Run pulumi as if it had been started in another directory
  -h, --help         Help for pulumi
";

    const CONFIG_HELP: &str = "\
Manage configuration

Usage:
  pulumi config [flags]

Flags:
  -h, --help           Help for config
  -s, --stack string   The name of the stack to operate on
";

    const UP_HELP: &str = "\
Create or update the resources in a stack

Usage:
  pulumi up [template|url] [flags]

Aliases:
  up, update

Flags:
  -h, --help             Help for up
  -m, --message string   Optional message to associate with the update operation
  -s, --stack string     The name of the stack to operate on
  -y, --yes              Automatically approve and perform the update
";

    fn test_config(root: &Path) -> Arc<XpulumiConfig> {
        Arc::new(XpulumiConfig {
            config_file: root.join("xpulumi.d/xpulumi.json"),
            format: ConfigFormat::Json,
            xpulumi_dir: root.join("xpulumi.d"),
            project_root_dir: root.to_path_buf(),
            pulumi_home: root.join("xpulumi.d/.pulumi"),
            default_backend_name: None,
            default_stack_name: Some("dev".to_string()),
            pulumi_version: None,
        })
    }

    fn base_env(extra: &[(&str, &str)]) -> EnvironmentVariables {
        let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
        let mut env: EnvironmentVariables = [("PATH".to_string(), path)].into_iter().collect();
        for (key, value) in extra {
            env.insert(*key, *value);
        }
        env
    }

    fn seed_backend(root: &Path) {
        let dir = root.join("xpulumi.d/backend/main");
        std::fs::create_dir_all(&dir).unwrap();
        BackendConfig {
            name: Some("main".to_string()),
            uri: Some("file://./state".to_string()),
            options: BackendOptions::default(),
        }
        .save(&dir)
        .unwrap();
    }

    fn seed_project(root: &Path, name: &str, dependencies: &[&str]) {
        let dir = root.join("xpulumi.d/project").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        ProjectConfig {
            name: Some(name.to_string()),
            backend: Some("main".to_string()),
            organization: Some("g".to_string()),
            dependencies: dependencies.iter().map(|d| (*d).to_string()).collect(),
            ..ProjectConfig::default()
        }
        .save(&dir)
        .unwrap();
        std::fs::write(
            dir.join("Pulumi.yaml"),
            format!("name: {name}\nruntime: python\n"),
        )
        .unwrap();
    }

    fn seed_inited_stack(root: &Path, project: &str, stack: &str) {
        let dir = root.join(format!(
            "xpulumi.d/backend/main/state/g/{project}/.pulumi/stacks"
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{stack}.json")),
            json!({"version": 3, "checkpoint": {"stack": stack}}).to_string(),
        )
        .unwrap();
    }

    /// Shell stand-in for the real CLI: records every invocation, serves
    /// the canned help screens, and dumps key environment variables.
    fn fake_pulumi(root: &Path, exit_code: i32) {
        let bin = root.join("xpulumi.d/.pulumi/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let help_dir = root.join("help");
        std::fs::create_dir_all(&help_dir).unwrap();
        for (name, text) in [("root", ROOT_HELP), ("config", CONFIG_HELP), ("up", UP_HELP)] {
            std::fs::write(help_dir.join(format!("{name}.txt")), text).unwrap();
        }
        let h = help_dir.display();
        let out = root.display();
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> {out}/calls.log\n\
             echo \"url=$PULUMI_BACKEND_URL\" > {out}/last_env.txt\n\
             echo \"raw=$XPULUMI_RAW_PULUMI\" >> {out}/last_env.txt\n\
             case \"$*\" in\n\
               \"version\") echo v3.99.0 ;;\n\
               \"--help\") cat {h}/root.txt ;;\n\
               \"config --help\") cat {h}/config.txt ;;\n\
               \"up --help\") cat {h}/up.txt ;;\n\
               *) exit {exit_code} ;;\n\
             esac\n"
        );
        let exe = bin.join("pulumi");
        std::fs::write(&exe, script).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&exe).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&exe, perms).unwrap();
        }
    }

    fn calls(root: &Path) -> Vec<String> {
        std::fs::read_to_string(root.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn last_env(root: &Path) -> String {
        std::fs::read_to_string(root.join("last_env.txt")).unwrap_or_default()
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| (*a).to_string()).collect()
    }

    async fn wrapper(
        root: &Path,
        cwd: &Path,
        env: EnvironmentVariables,
        args: &[&str],
    ) -> PulumiWrapper {
        let ctx = Arc::new(Context::new(test_config(root), cwd.to_path_buf(), env));
        PulumiWrapper::new(ctx, argv(args)).await.unwrap()
    }

    #[tokio::test]
    async fn raw_environment_variable_hands_through_untouched() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_pulumi(root, 7);

        let env = base_env(&[("XPULUMI_RAW_PULUMI", "1")]);
        let w = wrapper(root, root, env, &["up", "--weird-flag"]).await;
        let code = w.run().await.unwrap();

        assert_eq!(code, 7);
        // No version probe, no harvest: the only call is the passthrough.
        assert_eq!(calls(root), ["up --weird-flag"]);
    }

    #[tokio::test]
    async fn injects_default_stack_and_derives_environment() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_pulumi(root, 0);
        seed_backend(root);
        seed_project(root, "vpc", &[]);

        let cwd = root.join("xpulumi.d/project/vpc");
        let w = wrapper(root, &cwd, base_env(&[]), &["config"]).await;
        let code = w.run().await.unwrap();

        assert_eq!(code, 0);
        let calls = calls(root);
        assert_eq!(calls.last().map(String::as_str), Some("config --stack dev"));
        let env = last_env(root);
        assert!(env.contains("/state/g/vpc\n"));
        assert!(env.contains("raw=1"));
    }

    #[tokio::test]
    async fn help_is_answered_locally() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_pulumi(root, 0);
        seed_backend(root);
        seed_project(root, "vpc", &[]);

        let cwd = root.join("xpulumi.d/project/vpc");
        let w = wrapper(root, &cwd, base_env(&[]), &["config", "--help"]).await;
        let code = w.run().await.unwrap();

        assert_eq!(code, 0);
        // The harvest ran, but the command itself never reached the CLI.
        assert!(calls(root).iter().all(|line| !line.starts_with("config --")
            || line == "config --help"));
        assert!(!calls(root).iter().any(|line| line == "config --stack dev"));
    }

    #[tokio::test]
    async fn raw_pulumi_flag_skips_rewriting_but_keeps_the_environment() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_pulumi(root, 0);
        seed_backend(root);
        seed_project(root, "vpc", &[]);

        let cwd = root.join("xpulumi.d/project/vpc");
        let w = wrapper(root, &cwd, base_env(&[]), &["config", "--raw-pulumi"]).await;
        let code = w.run().await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(calls(root).last().map(String::as_str), Some("config"));
        assert!(last_env(root).contains("raw=1"));
    }

    #[tokio::test]
    async fn recursive_up_deploys_missing_dependencies_first() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fake_pulumi(root, 0);
        seed_backend(root);
        seed_project(root, "vpc", &[]);
        seed_project(root, "api", &["vpc"]);
        // api's stack exists already; vpc has never been inited.
        seed_inited_stack(root, "api", "dev");

        let cwd = root.join("xpulumi.d/project/api");
        let w = wrapper(root, &cwd, base_env(&[]), &["up", "-R", "--yes"]).await;
        let code = w.run().await.unwrap();

        assert_eq!(code, 0);
        let calls = calls(root);
        let dep = calls.iter().position(|l| l == "up --stack dev --yes").unwrap();
        let target = calls.iter().position(|l| l == "up --yes --stack dev").unwrap();
        assert!(dep < target);
    }
}
