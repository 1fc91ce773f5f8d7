//! Project-aware behavior layered over individual `pulumi` subcommands.
//!
//! Each handler owns one full subcommand (`up`, `stack rm`, ...). Before
//! parsing it may add wrapper-only flags to the help metadata; before
//! delegation it may rewrite the parsed command line; and its `run` step can
//! short-circuit the whole invocation with an exit code, typically after
//! consulting the stack dependency graph.

mod deploy;
mod stack_cmds;

use std::sync::Arc;

use async_trait::async_trait;
use xpulumi_backend::{Context, Project};
use xpulumi_core::{Error, Result};

use crate::help::PulumiMetadata;
use crate::parse::ParsedCommand;

pub use deploy::{DeployHandler, DestroyHandler, RefreshHandler};
pub use stack_cmds::{StackLsHandler, StackRmHandler};

/// What a handler's `run` step works against: the bound context, the
/// enclosing project when there is one, the (already tweaked) command line,
/// and the resolved stack name.
pub struct HandlerCx<'a> {
    pub ctx: &'a Arc<Context>,
    pub project: Option<&'a Arc<Project>>,
    pub parsed: &'a mut ParsedCommand,
    pub stack_name: Option<String>,
}

impl HandlerCx<'_> {
    pub fn require_project(&self) -> Result<&Arc<Project>> {
        self.project.ok_or_else(|| {
            Error::configuration(format!(
                "working directory '{}' is not inside an xpulumi project",
                self.ctx.cwd().display()
            ))
        })
    }

    pub fn require_stack_name(&self) -> Result<&str> {
        self.stack_name.as_deref().ok_or_else(|| {
            Error::configuration(
                "no stack selected; pass --stack or choose one with 'xpulumi stack select'",
            )
        })
    }
}

#[async_trait]
pub trait CommandHandler: Send {
    /// Full subcommand this handler owns, e.g. `"stack rm"`.
    fn topic(&self) -> &'static str;

    /// Add wrapper-only flags to the harvested metadata before parsing.
    fn extend_metadata(&self, _metadata: &mut PulumiMetadata) {}

    /// Rewrite the parsed command line before anything runs.
    fn tweak(&mut self, _parsed: &mut ParsedCommand) -> Result<()> {
        Ok(())
    }

    /// Project-aware step before delegation. `Ok(None)` falls through to
    /// the real CLI with the tweaked arguments; `Ok(Some(code))` ends the
    /// run with that exit code.
    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>>;
}

/// Every registered handler, one per wrapped subcommand.
#[must_use]
pub fn all_handlers() -> Vec<Box<dyn CommandHandler>> {
    vec![
        Box::new(DeployHandler::up()),
        Box::new(DeployHandler::preview()),
        Box::new(DestroyHandler::default()),
        Box::new(RefreshHandler),
        Box::new(StackRmHandler),
        Box::new(StackLsHandler),
    ]
}

const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

fn paint(text: &str) -> String {
    if atty::is(atty::Stream::Stderr) {
        format!("{GREEN}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Green three-line progress banner on stderr.
pub(crate) fn banner(message: &str) {
    let rule = "=".repeat(79);
    eprintln!();
    eprintln!("{}", paint(&rule));
    eprintln!("{}", paint(&format!("     {message}")));
    eprintln!("{}", paint(&rule));
    eprintln!();
}

pub(crate) fn note(message: &str) {
    eprintln!("{}", paint(&format!("NOTE: {message}")));
}

/// `<project>:<stack>` for messages.
pub(crate) fn full_stack_name(project: &Project, stack: &str) -> String {
    format!("{}:{stack}", project.name())
}

/// Exit code carried by a failed wrapped `pulumi` invocation, if any.
pub(crate) fn command_exit_code(err: &Error) -> Option<i32> {
    match err {
        Error::CommandExecution { exit_code, .. } => *exit_code,
        _ => None,
    }
}
