//! Core domain types, errors, and constants for the `xpulumi` application.
//!
//! This crate establishes the foundational data structures and error handling
//! mechanisms used throughout the workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all possible failure modes for predictable error handling.
//! - **`types`**: Domain-specific newtype wrappers such as
//!   `EnvironmentVariables` and `FullStackName` that enforce invariants at
//!   the type level.
//! - **`constants`**: Shared static constants such as environment variable
//!   names, magic Pulumi property names, and well-known file names.
//! - **`fsutil`**: Small filesystem helpers (atomic file replacement) shared
//!   by the config, installer, and wrapper crates.
//! - **`paths`**: Lexical path arithmetic used by config resolution and the
//!   nonstandard `file:` URL handling.

pub mod constants;
pub mod errors;
pub mod fsutil;
pub mod paths;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result, ResultExt},
    types::*,
};
