use xpulumi_core::Result;

use crate::commands::Commands;
use crate::globals::GlobalArgs;

impl Commands {
    pub async fn execute(self, globals: GlobalArgs) -> Result<()> {
        match self {
            Commands::Version => crate::commands::version::execute(globals).await,
            Commands::Init {
                backend_uri,
                stack,
                force,
            } => crate::commands::init::execute(globals, backend_uri, stack, force).await,
            Commands::ProjectRootDir => {
                let ctx = globals.context().await?;
                println!("{}", ctx.config().project_root_dir.display());
                Ok(())
            }
            Commands::InstallPulumi { version, force } => {
                crate::commands::install::execute(globals, version, force).await
            }
            Commands::UpdatePulumi => crate::commands::install::execute_update(globals).await,
            Commands::Backend { command } => command.execute(globals).await,
            Commands::Project { command } => command.execute(globals).await,
            Commands::Stack { command } => command.execute(globals).await,
            Commands::Run { raw_env, command } => {
                crate::commands::run::execute(globals, raw_env, command).await
            }
            Commands::Completion { shell } => crate::completion::generate(&shell),
        }
    }
}
