use clap::Parser;
use xpulumi::{Cli, GlobalArgs};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    xpulumi::logging::init(cli.quiet, cli.verbose, cli.color.stderr_ansi())?;

    let globals = GlobalArgs::new(cli.cwd, cli.config, cli.compact, cli.color)?;
    cli.command.execute(globals).await?;
    Ok(())
}
