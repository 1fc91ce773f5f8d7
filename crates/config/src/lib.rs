//! Configuration discovery and loading for xpulumi.
//!
//! An xpulumi workspace is marked by a small JSON or YAML file named
//! `xpulumi.json` / `xpulumi.yaml`, found either directly in a directory or
//! inside its `xpulumi.d/` subdirectory. Discovery walks from a starting
//! directory up through its parents, so any process running somewhere inside
//! a project tree finds the same configuration.
//!
//! The loaded [`XpulumiConfig`] is immutable and cheap to share via `Arc`;
//! the selection commands (`backend select`, `stack select`) persist their
//! changes by rewriting the config file on disk, preserving any keys they do
//! not understand.

mod config;
mod discovery;
mod file;
mod loader;

pub use config::XpulumiConfig;
pub use discovery::locate_config_file;
pub use file::{ConfigFileData, ConfigFormat};
pub use loader::ConfigLoader;
