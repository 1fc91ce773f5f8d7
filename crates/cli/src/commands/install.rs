use tracing::info;
use xpulumi_core::Result;
use xpulumi_installer::PulumiInstaller;

use crate::globals::GlobalArgs;

/// Install the pulumi CLI under the configured `pulumi_home`, honoring a
/// `pulumi_version` pin in the configuration unless `--version` overrides it.
pub async fn execute(globals: GlobalArgs, version: Option<String>, force: bool) -> Result<()> {
    let ctx = globals.context().await?;
    let mut installer = PulumiInstaller::new(ctx.pulumi_home()).force(force);
    if let Some(version) = version.or_else(|| ctx.config().pulumi_version.clone()) {
        installer = installer.version(version);
    }
    report(installer.install().await?)
}

/// Move to the latest pulumi release, ignoring any version pin.
pub async fn execute_update(globals: GlobalArgs) -> Result<()> {
    let ctx = globals.context().await?;
    report(PulumiInstaller::new(ctx.pulumi_home()).install().await?)
}

fn report(outcome: xpulumi_installer::InstallOutcome) -> Result<()> {
    if outcome.updated {
        info!(bin_dir = %outcome.bin_dir.display(), "installed pulumi");
    } else {
        info!("requested pulumi version already installed");
    }
    println!("pulumi v{}", outcome.version);
    Ok(())
}
