//! Handlers for `stack rm` and `stack ls`.

use async_trait::async_trait;
use chrono::Utc;
use xpulumi_backend::render_stack_table;
use xpulumi_core::{Error, Result};

use super::{full_stack_name, note, CommandHandler, HandlerCx};
use crate::help::PulumiMetadata;
use crate::parse::ParsedCommand;

/// `pulumi stack rm`: keeps the stack's configuration file unless asked not
/// to, and refuses to remove a stack that still has deployed resources.
pub struct StackRmHandler;

#[async_trait]
impl CommandHandler for StackRmHandler {
    fn topic(&self) -> &'static str {
        "stack rm"
    }

    fn extend_metadata(&self, metadata: &mut PulumiMetadata) {
        if let Some(topic) = metadata.topic_by_full_name_mut("stack rm") {
            topic.add_option(
                &["--remove-config"],
                "[xpulumi] Also delete the stack's Pulumi.<stack-name>.yaml configuration file",
                true,
            );
        }
    }

    fn tweak(&mut self, parsed: &mut ParsedCommand) -> Result<()> {
        let preserve = parsed.option_bool("--preserve-config");
        let remove = parsed.pop_option_bool("--remove-config");
        if preserve && remove {
            return Err(Error::configuration(
                "--preserve-config and --remove-config are mutually exclusive",
            ));
        }
        // Keeping the config file is the xpulumi default; the real CLI
        // deletes it unless told otherwise.
        if !preserve && !remove {
            parsed.set_flag("--preserve-config")?;
        }
        Ok(())
    }

    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>> {
        let project = cx.require_project()?.clone();
        let stack = cx.require_stack_name()?.to_string();
        let full = full_stack_name(&project, &stack);
        if !project.stack_is_inited(&stack).await? {
            note(&format!(
                "xpulumi stack '{full}' has already been removed or was never initialized"
            ));
            return Ok(Some(0));
        }
        if !project.is_deployable() {
            return Err(Error::stack(
                full.as_str(),
                "stack is not removable by this project",
            ));
        }
        if project.stack_is_deployed(&stack).await? {
            return Err(Error::stack(
                full.as_str(),
                "stack still has deployed resources; destroy it first with 'pulumi destroy'",
            ));
        }
        Ok(None)
    }
}

/// `pulumi stack ls` on blob backends: answered from backend state
/// directly, as a table or JSON. Service backends fall through to the real
/// CLI, which has richer listings there.
pub struct StackLsHandler;

#[async_trait]
impl CommandHandler for StackLsHandler {
    fn topic(&self) -> &'static str {
        "stack ls"
    }

    async fn run(&mut self, cx: &mut HandlerCx<'_>) -> Result<Option<i32>> {
        let project = cx.require_project()?.clone();
        if project.backend().is_service_backend() {
            return Ok(None);
        }
        let rows = project.stacks_metadata().await?;
        if cx.parsed.option_bool("--json") {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print!("{}", render_stack_table(&rows, Utc::now()));
        }
        Ok(Some(0))
    }
}
