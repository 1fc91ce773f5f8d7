//! Mapping from the host platform to Pulumi release asset names.

use xpulumi_core::{Error, Result};

/// The `<os>-<arch>` suffix Pulumi uses in release tarball names,
/// e.g. `linux-x64` or `darwin-arm64`.
pub fn release_asset_platform() -> Result<&'static str> {
    asset_platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn asset_platform_for(os: &str, arch: &str) -> Result<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Ok("linux-x64"),
        ("linux", "aarch64") => Ok("linux-arm64"),
        ("macos", "x86_64") => Ok("darwin-x64"),
        ("macos", "aarch64") => Ok("darwin-arm64"),
        _ => Err(Error::unsupported(
            "pulumi-install",
            format!("no Pulumi release tarball for {os}/{arch}"),
        )),
    }
}

/// Release tarball filename for a version on this platform.
pub fn release_asset_name(version: &str) -> Result<String> {
    Ok(format!(
        "pulumi-v{version}-{}.tar.gz",
        release_asset_platform()?
    ))
}

/// Checksum manifest filename for a version. Unlike the tarballs, the
/// version here carries no `v` prefix.
#[must_use]
pub fn checksum_file_name(version: &str) -> String {
    format!("pulumi-{version}-checksums.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_supported_platforms() {
        assert_eq!(asset_platform_for("linux", "x86_64").unwrap(), "linux-x64");
        assert_eq!(
            asset_platform_for("macos", "aarch64").unwrap(),
            "darwin-arm64"
        );
        assert!(asset_platform_for("windows", "x86_64").is_err());
    }

    #[test]
    fn names_follow_release_conventions() {
        assert_eq!(checksum_file_name("3.25.1"), "pulumi-3.25.1-checksums.txt");
        let asset = release_asset_name("3.25.1").unwrap();
        assert!(asset.starts_with("pulumi-v3.25.1-"));
        assert!(asset.ends_with(".tar.gz"));
    }
}
