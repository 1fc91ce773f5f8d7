//! Backend, project, and stack model for xpulumi
//!
//! This crate knows where Pulumi stack state lives and how to reach it:
//! named backend definitions, per-project backend URLs, deployment export
//! and secret decryption, the Pulumi service REST API, and the dependency
//! ordering between stacks.

pub mod api;
pub mod backend;
pub mod context;
pub mod fileurl;
pub mod graph;
pub mod metadata;
pub mod project;
pub mod stack;
pub mod state;
pub mod store;

pub use api::{PulumiApiClient, StackSummary};
pub use backend::{list_backend_names, Backend, BackendConfig, BackendOptions};
pub use context::Context;
pub use fileurl::{file_url_to_pathname, pathname_to_file_url, url_scheme};
pub use graph::{stack_build_order, stack_destroy_order, StackRef};
pub use metadata::{humanize_since, render_stack_table, StackMetadata};
pub use project::{list_project_names, Project, ProjectConfig};
pub use stack::{Stack, StackConfigFile};
pub use state::StackExport;
pub use store::{AwsCli, BlobStore};
