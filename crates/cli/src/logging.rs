//! Tracing setup for the xpulumi binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xpulumi_core::constants::XPULUMI_LOG_ENV_VAR;
use xpulumi_core::{Error, Result};

/// Install the global tracing subscriber.
///
/// Explicit `--quiet`/`--verbose` flags win; otherwise the filter comes
/// from `XPULUMI_LOG`, then `RUST_LOG`, then an `info` default. Output is
/// compact, target-less, and goes to stderr so stdout stays scriptable.
pub fn init(quiet: bool, verbose: u8, ansi: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose > 0 {
        EnvFilter::new(if verbose == 1 { "debug" } else { "trace" })
    } else if let Some(spec) = std::env::var(XPULUMI_LOG_ENV_VAR)
        .ok()
        .filter(|v| !v.is_empty())
    {
        EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .compact()
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::configuration(format!("cannot install tracing subscriber: {e}")))
}
