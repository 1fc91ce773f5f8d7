//! Domain-specific types shared across the workspace.

mod environment;
mod stack_name;

pub use environment::EnvironmentVariables;
pub use stack_name::{FullStackName, StackRef};
