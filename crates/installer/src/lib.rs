//! Project-local installation of the Pulumi CLI.
//!
//! Releases are downloaded from the official distribution site (or a
//! configured mirror), verified against the published SHA-256 manifest,
//! and unpacked into `<pulumi_home>/bin` so each project pins its own
//! Pulumi version.

pub mod install;
pub mod platform;
pub mod version;

pub use install::{installed_pulumi_version, InstallOutcome, PulumiInstaller};
pub use platform::{checksum_file_name, release_asset_name, release_asset_platform};
pub use version::{compare_versions, same_version, satisfies_min_version};
