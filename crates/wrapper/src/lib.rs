//! The `pulumi` wrapper: xpulumi's drop-in shim around the real CLI.
//!
//! The wrapper has no grammar of its own. It harvests the installed CLI's
//! `--help` output into a topic tree ([`help`]), parses the incoming
//! command line against that tree ([`parse`]), derives the environment the
//! project's backend calls for, and hands off to the real binary ([`run`]),
//! after project-aware handlers ([`handlers`]) have had their say about
//! dependencies, default stacks, and destructive operations.

pub mod handlers;
pub mod help;
pub mod parse;
pub mod run;

pub use help::{OptionInfo, PulumiMetadata, TopicInfo};
pub use parse::ParsedCommand;
pub use run::PulumiWrapper;
