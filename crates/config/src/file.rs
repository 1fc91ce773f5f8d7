//! On-disk representation of the xpulumi config file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use xpulumi_core::fsutil::write_atomic_string;
use xpulumi_core::{Error, Result};

/// Serialization format of a config file, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml` files are YAML; everything else is treated as JSON.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

/// The recognized keys of an xpulumi config file. Unknown keys are preserved
/// on rewrite but otherwise ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFileData {
    /// Directory owning the Pulumi installation, relative to the config
    /// file's directory. Defaults to that directory itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpulumi_dir: Option<String>,

    /// Project root, relative to `xpulumi_dir`. Defaults to `..`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root_dir: Option<String>,

    /// Pulumi home, relative to `xpulumi_dir`. Defaults to `.pulumi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulumi_home: Option<String>,

    /// Name of the backend used when none is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,

    /// Stack name selected for wrapper invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_stack: Option<String>,

    /// Pinned Pulumi CLI version for installs; latest when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulumi_version: Option<String>,
}

impl ConfigFileData {
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => Ok(serde_json::from_str(text)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(text)?),
        }
    }

    pub fn to_string(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => {
                let mut s = serde_json::to_string_pretty(self)?;
                s.push('\n');
                Ok(s)
            }
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }
}

/// Parse a config document into a generic JSON object, keeping every key.
pub(crate) fn parse_raw(text: &str, format: ConfigFormat) -> Result<serde_json::Map<String, Value>> {
    let value: Value = match format {
        ConfigFormat::Json => serde_json::from_str(text)?,
        ConfigFormat::Yaml => serde_yaml::from_str(text)?,
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(serde_json::Map::new()),
        other => Err(Error::configuration(format!(
            "config file must contain an object, found {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rewrite `key` in the config file at `path`, preserving all other keys.
///
/// The file is re-read so that concurrent edits to unrelated keys are not
/// clobbered, then replaced atomically.
pub(crate) fn update_config_key(path: &Path, key: &str, value: Value) -> Result<()> {
    let format = ConfigFormat::for_path(path);
    let text = fs::read_to_string(path)
        .map_err(|e| Error::file_system(path.to_path_buf(), "read config", e))?;
    let mut map = parse_raw(&text, format)?;
    map.insert(key.to_string(), value);
    let doc = Value::Object(map);
    let serialized = match format {
        ConfigFormat::Json => {
            let mut s = serde_json::to_string_pretty(&doc)?;
            s.push('\n');
            s
        }
        ConfigFormat::Yaml => serde_yaml::to_string(&doc)?,
    };
    write_atomic_string(path, &serialized)
}
