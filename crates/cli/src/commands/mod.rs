use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::globals::ColorMode;

pub mod backend;
pub mod init;
pub mod install;
pub mod project;
pub mod run;
pub mod stack;
pub mod version;

use self::backend::BackendCommands;
use self::project::ProjectCommands;
use self::stack::StackCommands;

#[derive(Parser)]
#[command(name = "xpulumi")]
#[command(about = "Project-scoped Pulumi installs, backends, and stacks", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Run as if started from DIR instead of the current directory
    #[arg(short = 'C', long = "cwd", value_name = "DIR", global = true)]
    pub cwd: Option<PathBuf>,

    /// Use an explicit configuration file instead of searching upward
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Emit JSON output on one line
    #[arg(short = 'c', long, global = true)]
    pub compact: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log more detail (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// When to color diagnostics on stderr
    #[arg(long, value_enum, global = true, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the xpulumi and pulumi versions
    Version,

    /// Create an xpulumi.d/ directory with a local file backend
    Init {
        /// URI of the initial backend
        #[arg(long, value_name = "URI")]
        backend_uri: Option<String>,

        /// Stack name to select by default
        #[arg(long, value_name = "NAME")]
        stack: Option<String>,

        /// Rewrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the project root directory
    ProjectRootDir,

    /// Download and install the pulumi CLI
    InstallPulumi {
        /// Version to install instead of the latest release
        #[arg(long, value_name = "VERSION")]
        version: Option<String>,

        /// Reinstall even if the version is already present
        #[arg(short, long)]
        force: bool,
    },

    /// Upgrade the pulumi CLI to the latest release
    UpdatePulumi,

    /// Manage backend declarations
    Backend {
        #[command(subcommand)]
        command: BackendCommands,
    },

    /// Manage project definitions
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Inspect and deploy stacks
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },

    /// Run a command with the xpulumi-managed environment
    Run {
        /// Pass the caller's environment through untouched
        #[arg(long)]
        raw_env: bool,

        /// Command and arguments (defaults to bash)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        shell: String,
    },
}
