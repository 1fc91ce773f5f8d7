//! The `pulumi` shim. Placed ahead of the real CLI on `PATH`, it forwards
//! every invocation with the xpulumi-managed environment filled in, and
//! answers a few commands itself. The child's exit code becomes ours.

use std::sync::Arc;

use xpulumi::globals::ColorMode;
use xpulumi_backend::Context;
use xpulumi_config::ConfigLoader;
use xpulumi_core::EnvironmentVariables;
use xpulumi_wrapper::PulumiWrapper;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    xpulumi::logging::init(false, 0, ColorMode::Auto.stderr_ansi())?;

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cwd = std::env::current_dir()?;
    let env = EnvironmentVariables::from_os();
    let config = Arc::new(
        ConfigLoader::new()
            .starting_dir(&cwd)
            .env(env.clone())
            .load()
            .await?,
    );
    let ctx = Arc::new(Context::new(config, cwd, env));

    let code = PulumiWrapper::new(ctx, argv).await?.run().await?;
    std::process::exit(code);
}
