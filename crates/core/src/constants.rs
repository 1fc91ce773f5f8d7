//! Shared constants used across the xpulumi workspace.

/// The Pulumi service backend used when a backend declares no URI of its own.
pub const PULUMI_STANDARD_BACKEND: &str = "https://api.pulumi.com";

/// Magic JSON property name marking an object as a Pulumi secret wrapper.
pub const PULUMI_JSON_SECRET_PROPERTY_NAME: &str = "4dabf18193072939515e22adb298388d";

/// Magic JSON property value paired with [`PULUMI_JSON_SECRET_PROPERTY_NAME`].
pub const PULUMI_JSON_SECRET_PROPERTY_VALUE: &str = "1b47061264138c4ac30d75fd1eb44270";

/// Replacement string for secret output values that are not decrypted.
pub const SECRET_MASK: &str = "[secret]";

/// Name of the infrastructure directory under the project root.
pub const XPULUMI_INFRA_DIRNAME: &str = "xpulumi.d";

/// Stem of the xpulumi configuration file (`xpulumi.json` / `xpulumi.yaml`).
pub const XPULUMI_CONFIG_FILENAME_BASE: &str = "xpulumi";

/// Environment variable that points at an explicit config file or directory.
pub const XPULUMI_CONFIG_ENV_VAR: &str = "XPULUMI_CONFIG";

/// Environment variable that, when set nonempty, makes the `pulumi` shim pass
/// straight through to the real CLI without any rewriting.
pub const XPULUMI_RAW_PULUMI_ENV_VAR: &str = "XPULUMI_RAW_PULUMI";

/// Environment variable enabling verbose wrapper diagnostics.
pub const XPULUMI_DEBUG_PULUMI_ENV_VAR: &str = "XPULUMI_DEBUG_PULUMI";

/// Environment variable filter for log output, consulted before `RUST_LOG`.
pub const XPULUMI_LOG_ENV_VAR: &str = "XPULUMI_LOG";

/// Default secret-kv key holding the Pulumi secrets passphrase.
pub const PULUMI_PASSPHRASE_SECRET_KEY: &str = "pulumi/passphrase";

/// Environment variables consumed by the Pulumi CLI itself.
pub const PULUMI_HOME_ENV_VAR: &str = "PULUMI_HOME";
pub const PULUMI_BACKEND_URL_ENV_VAR: &str = "PULUMI_BACKEND_URL";
pub const PULUMI_ACCESS_TOKEN_ENV_VAR: &str = "PULUMI_ACCESS_TOKEN";
pub const PULUMI_CONFIG_PASSPHRASE_ENV_VAR: &str = "PULUMI_CONFIG_PASSPHRASE";

/// Plain-text endpoint returning the latest released Pulumi version.
pub const PULUMI_LATEST_VERSION_URL: &str = "https://www.pulumi.com/latest-version";

/// Base URL for Pulumi SDK release artifacts.
pub const PULUMI_RELEASE_BASE_URL: &str = "https://get.pulumi.com/releases/sdk";

/// File name of the cached Pulumi help metadata, relative to the Pulumi home.
pub const PULUMI_HELP_METADATA_FILENAME: &str = "pulumi_help_metadata.json";

/// Per-backend config file name inside `xpulumi.d/backend/<name>/`.
pub const BACKEND_CONFIG_FILENAME: &str = "backend.json";

/// Per-project config file name inside `xpulumi.d/project/<name>/`.
pub const PROJECT_CONFIG_FILENAME: &str = "xpulumi-project.json";

/// Resource type of the synthetic root resource that carries stack outputs.
pub const PULUMI_STACK_RESOURCE_TYPE: &str = "pulumi:pulumi:Stack";
