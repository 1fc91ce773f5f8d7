//! Command-line surface of xpulumi.
//!
//! Two binaries are built from this crate: `xpulumi`, the management CLI
//! defined by [`commands::Cli`], and `pulumi`, a shim that routes every
//! invocation through [`xpulumi_wrapper::PulumiWrapper`] so that plain
//! `pulumi` commands pick up the project's backend, home directory, and
//! secrets without any flags.

pub mod commands;
pub mod completion;
pub mod execute;
pub mod globals;
pub mod logging;
pub mod output;

pub use commands::{Cli, Commands};
pub use globals::{ColorMode, GlobalArgs};
