//! Handlers for `up`, `preview`, `destroy`, and `refresh`: the commands
//! where stack dependency order matters.

use async_trait::async_trait;
use xpulumi_backend::{graph, Project};
use xpulumi_core::{Error, Result};

use super::{banner, command_exit_code, full_stack_name, note, CommandHandler, HandlerCx};
use crate::help::PulumiMetadata;
use crate::parse::ParsedCommand;

#[derive(Clone, Copy)]
enum DeployAction {
    Up,
    Preview,
}

/// `pulumi up` / `pulumi preview` with dependency awareness: refuses to run
/// while prerequisites are missing, or deploys them first with
/// `--recursive`.
pub struct DeployHandler {
    action: DeployAction,
    recursive: bool,
    yes: bool,
}

impl DeployHandler {
    #[must_use]
    pub fn up() -> Self {
        Self {
            action: DeployAction::Up,
            recursive: false,
            yes: false,
        }
    }

    #[must_use]
    pub fn preview() -> Self {
        Self {
            action: DeployAction::Preview,
            recursive: false,
            yes: false,
        }
    }
}

#[async_trait]
impl CommandHandler for DeployHandler {
    fn topic(&self) -> &'static str {
        match self.action {
            DeployAction::Up => "up",
            DeployAction::Preview => "preview",
        }
    }

    fn extend_metadata(&self, metadata: &mut PulumiMetadata) {
        let Some(topic) = metadata.topic_by_full_name_mut(self.topic()) else {
            return;
        };
        topic.add_option(
            &["-R", "--recursive"],
            "[xpulumi] Recursively deploy dependencies first",
            true,
        );
        if matches!(self.action, DeployAction::Preview) {
            topic.add_option(
                &["-y", "--yes"],
                "[xpulumi] On recursion, automatically approve and perform each dependency update",
                true,
            );
        }
    }

    fn tweak(&mut self, parsed: &mut ParsedCommand) -> Result<()> {
        self.recursive = parsed.pop_option_bool("--recursive");
        self.yes = match self.action {
            DeployAction::Up => parsed.option_bool("--yes"),
            // The real `preview` has no --yes; it only steers dependency
            // deploys and must not reach the CLI.
            DeployAction::Preview => parsed.pop_option_bool("--yes"),
        };
        Ok(())
    }

    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>> {
        let project = cx.require_project()?.clone();
        let stack = cx.require_stack_name()?.to_string();
        let full = full_stack_name(&project, &stack);

        if !project.is_deployable() {
            if project.stack_is_deployed(&stack).await? {
                note(&format!(
                    "xpulumi stack '{full}' is not deployable by this project, but it is \
                     already deployed; assuming it is up to date"
                ));
                return Ok(Some(0));
            }
            return Err(Error::stack(full.as_str(), "stack is not deployable"));
        }

        let order = graph::stack_build_order(cx.ctx, project.name(), &stack).await?;
        let dependencies: Vec<_> = order
            .into_iter()
            .filter(|r| r.project != project.name())
            .collect();
        if !dependencies.is_empty() {
            if self.recursive {
                for dep in &dependencies {
                    let dep_project = Project::load(cx.ctx.clone(), Some(&dep.project)).await?;
                    banner(&format!(
                        "Deploying prerequisite xpulumi project {}, stack {}",
                        dep_project.name(),
                        dep.stack
                    ));
                    dep_project.init_stack(&dep.stack).await?;
                    let mut args =
                        vec!["up".to_string(), "--stack".to_string(), dep.stack.clone()];
                    if self.yes {
                        args.push("--yes".to_string());
                    }
                    if let Err(err) = dep_project.call_pulumi(&args, Some(&dep.stack)).await {
                        match command_exit_code(&err) {
                            Some(code) => return Ok(Some(code)),
                            None => return Err(err),
                        }
                    }
                }
                let doing = match self.action {
                    DeployAction::Up => "deploying",
                    DeployAction::Preview => "previewing",
                };
                banner(&format!(
                    "All prerequisites deployed; {doing} xpulumi project {}, stack {stack}",
                    project.name()
                ));
            } else {
                let mut undeployed = Vec::new();
                for dep in &dependencies {
                    let dep_project = Project::load(cx.ctx.clone(), Some(&dep.project)).await?;
                    if !dep_project.stack_is_deployed(&dep.stack).await? {
                        undeployed.push(dep.to_string());
                    }
                }
                if !undeployed.is_empty() {
                    let action = match self.action {
                        DeployAction::Up => "deploy",
                        DeployAction::Preview => "preview",
                    };
                    return Err(Error::stack(
                        full.as_str(),
                        format!(
                            "cannot {action} until dependencies are deployed: {} \
                             (or pass --recursive)",
                            undeployed.join(", ")
                        ),
                    ));
                }
            }
        }

        project.init_stack(&stack).await?;
        Ok(None)
    }
}

/// `pulumi destroy`, refusing while deployed stacks still depend on this
/// one, or tearing them down first with `--recursive`.
#[derive(Default)]
pub struct DestroyHandler {
    recursive: bool,
    yes: bool,
}

#[async_trait]
impl CommandHandler for DestroyHandler {
    fn topic(&self) -> &'static str {
        "destroy"
    }

    fn extend_metadata(&self, metadata: &mut PulumiMetadata) {
        if let Some(topic) = metadata.topic_by_full_name_mut("destroy") {
            topic.add_option(
                &["-R", "--recursive"],
                "[xpulumi] Recursively destroy dependent stacks first",
                true,
            );
        }
    }

    fn tweak(&mut self, parsed: &mut ParsedCommand) -> Result<()> {
        self.recursive = parsed.pop_option_bool("--recursive");
        self.yes = parsed.option_bool("--yes");
        Ok(())
    }

    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>> {
        let project = cx.require_project()?.clone();
        let stack = cx.require_stack_name()?.to_string();
        let full = full_stack_name(&project, &stack);

        if !project.stack_is_deployed(&stack).await? {
            note(&format!(
                "xpulumi stack '{full}' has already been destroyed or has never been deployed"
            ));
            return Ok(Some(0));
        }
        if !project.is_deployable() {
            return Err(Error::stack(full.as_str(), "stack is not destroyable"));
        }

        let order = graph::stack_destroy_order(cx.ctx, project.name(), &stack).await?;
        let mut deployed_dependents = Vec::new();
        for dependent in &order {
            if dependent.project == project.name() {
                continue;
            }
            let dep_project = Project::load(cx.ctx.clone(), Some(&dependent.project)).await?;
            if dep_project.stack_is_deployed(&dependent.stack).await? {
                deployed_dependents.push((dep_project, dependent.stack.clone()));
            } else if self.recursive {
                note(&format!(
                    "dependent xpulumi stack '{dependent}' has already been destroyed or has \
                     never been deployed"
                ));
            }
        }
        if !deployed_dependents.is_empty() {
            if !self.recursive {
                let listing = deployed_dependents
                    .iter()
                    .map(|(p, s)| format!("{}:{s}", p.name()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Error::stack(
                    full.as_str(),
                    format!(
                        "cannot destroy until dependent stacks are destroyed: {listing} \
                         (or pass --recursive)"
                    ),
                ));
            }
            for (dep_project, dep_stack) in &deployed_dependents {
                banner(&format!(
                    "Destroying dependent xpulumi project {}, stack {dep_stack}",
                    dep_project.name()
                ));
                let mut args = vec![
                    "destroy".to_string(),
                    "--stack".to_string(),
                    dep_stack.clone(),
                ];
                if self.yes {
                    args.push("--yes".to_string());
                }
                if let Err(err) = dep_project.call_pulumi(&args, Some(dep_stack)).await {
                    match command_exit_code(&err) {
                        Some(code) => return Ok(Some(code)),
                        None => return Err(err),
                    }
                }
            }
            banner(&format!(
                "All dependent stacks destroyed; destroying xpulumi project {}, stack {stack}",
                project.name()
            ));
        }
        Ok(None)
    }
}

/// `pulumi refresh`: only sensible on a deployed stack this project owns.
pub struct RefreshHandler;

#[async_trait]
impl CommandHandler for RefreshHandler {
    fn topic(&self) -> &'static str {
        "refresh"
    }

    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>> {
        let project = cx.require_project()?.clone();
        let stack = cx.require_stack_name()?.to_string();
        let full = full_stack_name(&project, &stack);
        if !project.stack_is_deployed(&stack).await? {
            return Err(Error::stack(
                full.as_str(),
                "stack has not been deployed, or has been destroyed",
            ));
        }
        if !project.is_deployable() {
            return Err(Error::stack(
                full.as_str(),
                "stack is not refreshable by this project",
            ));
        }
        Ok(None)
    }
}
