use xpulumi_core::Result;
use xpulumi_installer::installed_pulumi_version;

use crate::globals::GlobalArgs;

/// Report the xpulumi version, and the managed pulumi version when one is
/// installed. Works outside any project; a missing configuration only
/// suppresses the pulumi line.
pub async fn execute(globals: GlobalArgs) -> Result<()> {
    println!("xpulumi {}", env!("CARGO_PKG_VERSION"));
    if let Ok(ctx) = globals.context().await {
        if let Some(version) = installed_pulumi_version(&ctx.pulumi_home()).await {
            println!("pulumi v{version}");
        }
    }
    Ok(())
}
