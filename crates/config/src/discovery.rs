//! Locating the xpulumi configuration file.

use std::path::{Path, PathBuf};
use xpulumi_core::constants::{XPULUMI_CONFIG_FILENAME_BASE, XPULUMI_INFRA_DIRNAME};
use xpulumi_core::paths::{abs_join, expand_user};
use xpulumi_core::{Error, Result};

/// Candidate file names probed in each directory, in priority order.
fn candidates() -> [PathBuf; 4] {
    let json = format!("{XPULUMI_CONFIG_FILENAME_BASE}.json");
    let yaml = format!("{XPULUMI_CONFIG_FILENAME_BASE}.yaml");
    [
        PathBuf::from(&json),
        PathBuf::from(&yaml),
        Path::new(XPULUMI_INFRA_DIRNAME).join(&json),
        Path::new(XPULUMI_INFRA_DIRNAME).join(&yaml),
    ]
}

/// Locate the xpulumi config file.
///
/// `config_path` is an explicit override (typically from `--config` or the
/// `XPULUMI_CONFIG` environment variable), resolved against `starting_dir`.
/// When it names a file, that file is used directly; when it names a
/// directory, that directory is scanned instead of `starting_dir`. Without an
/// override, `starting_dir` and each of its parents are probed for
/// `xpulumi.json`, `xpulumi.yaml`, `xpulumi.d/xpulumi.json`, or
/// `xpulumi.d/xpulumi.yaml`, first hit winning.
pub fn locate_config_file(
    starting_dir: &Path,
    config_path: Option<&Path>,
    scan_parent_dirs: bool,
) -> Result<PathBuf> {
    let search_root = match config_path {
        Some(p) => {
            let expanded = expand_user(&p.to_string_lossy());
            let resolved = abs_join(starting_dir, &expanded);
            if !resolved.exists() {
                return Err(Error::configuration(format!(
                    "config file not found: '{}'",
                    resolved.display()
                )));
            }
            if resolved.is_file() {
                return Ok(resolved);
            }
            if !resolved.is_dir() {
                return Err(Error::configuration(format!(
                    "config path is neither a file nor a directory: '{}'",
                    resolved.display()
                )));
            }
            resolved
        }
        None => starting_dir.to_path_buf(),
    };

    let names = candidates();
    let mut dir = search_root.clone();
    loop {
        for name in &names {
            let probe = dir.join(name);
            if probe.is_file() {
                tracing::debug!(config_file = %probe.display(), "located xpulumi config");
                return Ok(probe);
            }
        }
        let parent = match dir.parent() {
            Some(p) if scan_parent_dirs => p.to_path_buf(),
            _ => break,
        };
        if parent == dir {
            break;
        }
        dir = parent;
    }

    Err(Error::ConfigNotFound {
        start_dir: search_root,
    })
}
