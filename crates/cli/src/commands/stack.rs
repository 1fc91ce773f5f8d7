use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use serde_json::Value;
use tracing::info;
use xpulumi_backend::{render_stack_table, stack_build_order, Context, Project, Stack};
use xpulumi_core::{Error, Result, StackRef};

use crate::globals::GlobalArgs;
use crate::output::{banner, print_json, render_table};

#[derive(Subcommand)]
pub enum StackCommands {
    /// Make a stack name the default for later commands
    Select {
        /// Stack name
        name: String,
    },

    /// Print the stacks a stack builds on, dependencies first
    Dependencies {
        /// Stack to inspect, as [PROJECT]:[STACK]; missing halves come
        /// from the working directory and the selected default
        stack: Option<StackRef>,
    },

    /// List the stacks of the enclosing project
    Ls {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export a stack's deployment state as JSON
    Export {
        /// Stack to export, as [PROJECT]:[STACK]
        stack: Option<StackRef>,

        /// Decrypt secret values in the export
        #[arg(long)]
        decrypt: bool,
    },

    /// Print a stack's outputs
    Output {
        /// Stack to read, as [PROJECT]:[STACK]
        stack: Option<StackRef>,

        /// Decrypt secret outputs
        #[arg(long)]
        decrypt: bool,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Deploy the selected stack and everything it depends on, in order
    AllUp {
        /// Pass --yes to every pulumi up
        #[arg(long)]
        yes: bool,
    },
}

impl StackCommands {
    pub async fn execute(self, globals: GlobalArgs) -> Result<()> {
        let ctx = globals.context().await?;
        match self {
            StackCommands::Select { name } => {
                ctx.config().set_default_stack(&name)?;
                info!(stack = %name, "selected default stack");
                Ok(())
            }
            StackCommands::Dependencies { stack } => {
                for line in dependency_lines(&ctx, stack).await? {
                    println!("{line}");
                }
                Ok(())
            }
            StackCommands::Ls { json } => list_stacks(&ctx, json, globals.compact).await,
            StackCommands::Export { stack, decrypt } => {
                let stack = load_stack(&ctx, stack).await?;
                print_json(&stack.export(decrypt).await?.to_value(), globals.compact)
            }
            StackCommands::Output {
                stack,
                decrypt,
                json,
            } => print_outputs(&ctx, stack, decrypt, json, globals.compact).await,
            StackCommands::AllUp { yes } => all_up(&ctx, yes, globals.color.stderr_ansi()).await,
        }
    }
}

/// Resolve an optional `[PROJECT]:[STACK]` argument against the working
/// directory and the configured defaults.
async fn load_stack(ctx: &Arc<Context>, stack: Option<StackRef>) -> Result<Stack> {
    let stack = stack.unwrap_or_default();
    Stack::load(
        ctx.clone(),
        stack.project.as_deref(),
        stack.stack.as_deref(),
    )
    .await
}

/// Full names of the stacks the target builds on, dependencies first, the
/// target itself excluded.
async fn dependency_lines(ctx: &Arc<Context>, stack: Option<StackRef>) -> Result<Vec<String>> {
    let stack = load_stack(ctx, stack).await?;
    let mut order = stack_build_order(ctx, stack.project().name(), stack.name()).await?;
    order.pop();
    Ok(order.into_iter().map(|dep| dep.to_string()).collect())
}

async fn list_stacks(ctx: &Arc<Context>, json: bool, compact: bool) -> Result<()> {
    let project = Project::load(ctx.clone(), None).await?;
    let stacks = project.stacks_metadata().await?;
    if json {
        print_json(&serde_json::to_value(&stacks)?, compact)?;
    } else {
        print!("{}", render_stack_table(&stacks, Utc::now()));
    }
    Ok(())
}

async fn print_outputs(
    ctx: &Arc<Context>,
    stack: Option<StackRef>,
    decrypt: bool,
    json: bool,
    compact: bool,
) -> Result<()> {
    let stack = load_stack(ctx, stack).await?;
    let outputs = stack.outputs(decrypt).await?;
    if json {
        print_json(&Value::Object(outputs), compact)?;
    } else {
        let rows = outputs
            .into_iter()
            .map(|(name, value)| vec![name, render_value(&value)])
            .collect::<Vec<_>>();
        print!("{}", render_table(&["OUTPUT", "VALUE"], &rows));
    }
    Ok(())
}

/// Strings print bare; everything else as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deploy the selected stack after bringing up everything it depends on,
/// creating each stack in its backend first when necessary.
async fn all_up(ctx: &Arc<Context>, yes: bool, ansi: bool) -> Result<()> {
    let target = load_stack(ctx, None).await?;
    let order = stack_build_order(ctx, target.project().name(), target.name()).await?;
    for step in order {
        let project = Project::load(ctx.clone(), Some(&step.project)).await?;
        banner(
            &format!(
                "Building xpulumi project {}, stack {}",
                step.project, step.stack
            ),
            ansi,
        );
        project.init_stack(&step.stack).await?;
        let mut args = vec!["up".to_string(), "--stack".to_string(), step.stack.clone()];
        if yes {
            args.push("--yes".to_string());
        }
        if let Err(err) = project.call_pulumi(&args, Some(&step.stack)).await {
            // A child failure becomes our own exit code, like a wrapped
            // pulumi invocation.
            if let Some(code) = command_exit_code(&err) {
                std::process::exit(code);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// The child's exit code, when an error wraps a failed subprocess.
fn command_exit_code(err: &Error) -> Option<i32> {
    match err {
        Error::CommandExecution { exit_code, .. } => *exit_code,
        _ => None,
    }
}
