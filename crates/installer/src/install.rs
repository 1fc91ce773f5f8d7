//! Download, verify, and unpack a Pulumi release into `<pulumi_home>/bin`.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use xpulumi_core::constants::{PULUMI_LATEST_VERSION_URL, PULUMI_RELEASE_BASE_URL};
use xpulumi_core::{Error, Result};

use crate::platform::{checksum_file_name, release_asset_name};
use crate::version::{same_version, satisfies_min_version};

/// What [`PulumiInstaller::install`] ended up doing.
#[derive(Debug)]
pub struct InstallOutcome {
    /// Version now present under the Pulumi home.
    pub version: String,
    pub bin_dir: PathBuf,
    /// `false` when the existing install already satisfied the request.
    pub updated: bool,
}

/// Builder for installing the Pulumi CLI into a project-local home.
#[derive(Debug)]
pub struct PulumiInstaller {
    pulumi_home: PathBuf,
    version: Option<String>,
    min_version: Option<String>,
    force: bool,
    latest_version_url: String,
    release_base_url: String,
}

impl PulumiInstaller {
    #[must_use]
    pub fn new(pulumi_home: impl Into<PathBuf>) -> Self {
        Self {
            pulumi_home: pulumi_home.into(),
            version: None,
            min_version: None,
            force: false,
            latest_version_url: PULUMI_LATEST_VERSION_URL.to_string(),
            release_base_url: PULUMI_RELEASE_BASE_URL.to_string(),
        }
    }

    /// Install an exact version instead of the latest release. The literal
    /// `latest` keeps the default behavior.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Accept any existing install at or above this version.
    #[must_use]
    pub fn min_version(mut self, min_version: impl Into<String>) -> Self {
        self.min_version = Some(min_version.into());
        self
    }

    /// Reinstall even when the requested version is already present.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Where to ask for the latest release version.
    #[must_use]
    pub fn latest_version_url(mut self, url: impl Into<String>) -> Self {
        self.latest_version_url = url.into();
        self
    }

    /// Base URL serving release tarballs and checksum manifests, for
    /// mirrors.
    #[must_use]
    pub fn release_base_url(mut self, url: impl Into<String>) -> Self {
        self.release_base_url = url.into();
        self
    }

    pub async fn install(self) -> Result<InstallOutcome> {
        let bin_dir = self.pulumi_home.join("bin");
        let explicit = self
            .version
            .as_deref()
            .filter(|v| *v != "latest")
            .map(|v| v.trim_start_matches('v').to_string());

        let current = installed_pulumi_version(&self.pulumi_home).await;
        if !self.force {
            if let Some(current) = &current {
                let satisfied = match (&explicit, &self.min_version) {
                    (Some(target), _) => same_version(current, target),
                    (None, Some(min)) => satisfies_min_version(current, min),
                    (None, None) => false,
                };
                if satisfied {
                    debug!(version = %current, "existing pulumi install satisfies request");
                    return Ok(InstallOutcome {
                        version: current.clone(),
                        bin_dir,
                        updated: false,
                    });
                }
            }
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::install(format!("cannot build HTTP client: {e}")))?;
        let target = match explicit {
            Some(target) => target,
            None => fetch_latest_version(&http, &self.latest_version_url).await?,
        };
        if !self.force {
            if let Some(current) = &current {
                if same_version(current, &target) {
                    return Ok(InstallOutcome {
                        version: current.clone(),
                        bin_dir,
                        updated: false,
                    });
                }
            }
        }

        tokio::fs::create_dir_all(&self.pulumi_home)
            .await
            .map_err(|e| Error::file_system(&self.pulumi_home, "create", e))?;
        let lock_path = self.pulumi_home.join(".install.lock");
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::file_system(&lock_path, "open", e))?;
        lock.lock_exclusive()
            .map_err(|e| Error::file_system(&lock_path, "lock", e))?;

        // Another process may have finished the same install while we
        // waited for the lock.
        if !self.force {
            if let Some(current) = installed_pulumi_version(&self.pulumi_home).await {
                if same_version(&current, &target) {
                    let _ = lock.unlock();
                    return Ok(InstallOutcome {
                        version: current,
                        bin_dir,
                        updated: false,
                    });
                }
            }
        }

        let result = self.download_and_extract(&http, &target, &bin_dir).await;
        let _ = lock.unlock();
        result?;

        info!(version = %target, bin_dir = %bin_dir.display(), "installed pulumi");
        Ok(InstallOutcome {
            version: target,
            bin_dir,
            updated: true,
        })
    }

    async fn download_and_extract(
        &self,
        http: &reqwest::Client,
        version: &str,
        bin_dir: &Path,
    ) -> Result<()> {
        let base = self.release_base_url.trim_end_matches('/');
        let asset = release_asset_name(version)?;
        let expected = fetch_expected_digest(http, base, version, &asset).await?;

        let asset_url = format!("{base}/{asset}");
        debug!(%asset_url, "downloading pulumi release");
        let mut response = http
            .get(&asset_url)
            .send()
            .await
            .map_err(|e| Error::network(&asset_url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::install(format!(
                "download failed with HTTP {} for '{asset_url}'",
                response.status().as_u16()
            )));
        }

        let mut tarball = tempfile::NamedTempFile::new()
            .map_err(|e| Error::install(format!("cannot create staging file: {e}")))?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::network(&asset_url, e.to_string()))?
        {
            hasher.update(&chunk);
            tarball
                .write_all(&chunk)
                .map_err(|e| Error::install(format!("cannot stage download: {e}")))?;
        }
        let digest = hex::encode(hasher.finalize());
        if digest != expected {
            return Err(Error::install(format!(
                "checksum mismatch for '{asset}': manifest says {expected}, downloaded {digest}"
            )));
        }
        tarball
            .flush()
            .map_err(|e| Error::install(format!("cannot stage download: {e}")))?;

        let tar_path = tarball.path().to_path_buf();
        let dest = bin_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_bin_dir(&tar_path, &dest))
            .await
            .map_err(|e| Error::install(format!("extraction task failed: {e}")))??;
        Ok(())
    }
}

/// Version of the Pulumi CLI already present under a home directory, as
/// reported by `pulumi version`.
pub async fn installed_pulumi_version(pulumi_home: &Path) -> Option<String> {
    let exe = pulumi_home.join("bin").join("pulumi");
    let output = tokio::process::Command::new(&exe)
        .arg("version")
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.split_whitespace().next()?;
    Some(first.trim_start_matches('v').to_string())
}

async fn fetch_latest_version(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::network(url, e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::network(
            url,
            format!("HTTP {}", response.status().as_u16()),
        ));
    }
    let text = response
        .text()
        .await
        .map_err(|e| Error::network(url, e.to_string()))?;
    let version = text.trim().trim_start_matches('v');
    if version.is_empty() {
        return Err(Error::install("empty latest-version response"));
    }
    Ok(version.to_string())
}

async fn fetch_expected_digest(
    http: &reqwest::Client,
    base: &str,
    version: &str,
    asset: &str,
) -> Result<String> {
    let url = format!("{base}/{}", checksum_file_name(version));
    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::network(&url, e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::install(format!(
            "checksum manifest missing (HTTP {}) at '{url}'",
            response.status().as_u16()
        )));
    }
    let text = response
        .text()
        .await
        .map_err(|e| Error::network(&url, e.to_string()))?;
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(digest), Some(name)) = (parts.next(), parts.next()) {
            // sha256sum marks binary-mode files with a leading '*'.
            if name.trim_start_matches('*') == asset {
                return Ok(digest.to_ascii_lowercase());
            }
        }
    }
    Err(Error::install(format!(
        "no checksum for '{asset}' in '{url}'"
    )))
}

/// Unpack the `pulumi/` directory of a release tarball into `bin_dir`.
fn extract_bin_dir(tar_path: &Path, bin_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(tar_path)
        .map_err(|e| Error::file_system(tar_path, "open", e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    std::fs::create_dir_all(bin_dir).map_err(|e| Error::file_system(bin_dir, "create", e))?;

    for entry in archive
        .entries()
        .map_err(|e| Error::install(format!("unreadable release tarball: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| Error::install(format!("unreadable release tarball: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::install(format!("unreadable release tarball: {e}")))?
            .into_owned();
        let Ok(rel) = path.strip_prefix("pulumi") else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        if rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::install(format!(
                "unsafe path '{}' in release tarball",
                path.display()
            )));
        }
        let dest = bin_dir.join(rel);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest)
                .map_err(|e| Error::file_system(&dest, "create", e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::file_system(parent, "create", e))?;
        }
        entry
            .unpack(&dest)
            .map_err(|e| Error::file_system(&dest, "unpack", e))?;
    }
    Ok(())
}
