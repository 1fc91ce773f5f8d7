//! Dotted version comparison for Pulumi releases.
//!
//! Pulumi versions are plain `major.minor.patch` with an optional `v`
//! prefix and occasionally a `-pre` tail. Numeric fields compare
//! numerically; a pre-release sorts before its release.

use std::cmp::Ordering;

fn split(version: &str) -> (Vec<u64>, Option<&str>) {
    let version = version.trim().trim_start_matches('v');
    let (numbers, pre) = match version.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (version, None),
    };
    let fields = numbers
        .split('.')
        .map(|field| field.parse::<u64>().unwrap_or(0))
        .collect();
    (fields, pre)
}

/// Compare two dotted versions, tolerating `v` prefixes and differing
/// field counts.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_fields, a_pre) = split(a);
    let (b_fields, b_pre) = split(b);
    let len = a_fields.len().max(b_fields.len());
    for i in 0..len {
        let a_field = a_fields.get(i).copied().unwrap_or(0);
        let b_field = b_fields.get(i).copied().unwrap_or(0);
        match a_field.cmp(&b_field) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(a_pre), Some(b_pre)) => a_pre.cmp(b_pre),
    }
}

/// Whether an installed version meets a minimum requirement.
#[must_use]
pub fn satisfies_min_version(installed: &str, min_version: &str) -> bool {
    compare_versions(installed, min_version) != Ordering::Less
}

/// Whether two version strings name the same release.
#[must_use]
pub fn same_version(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_compare_numerically() {
        assert_eq!(compare_versions("3.9.0", "3.10.0"), Ordering::Less);
        assert_eq!(compare_versions("3.10.0", "3.10"), Ordering::Equal);
        assert_eq!(compare_versions("v3.25.1", "3.25.1"), Ordering::Equal);
        assert_eq!(compare_versions("4.0.0", "3.99.99"), Ordering::Greater);
    }

    #[test]
    fn prereleases_sort_before_releases() {
        assert_eq!(compare_versions("3.25.1-beta.1", "3.25.1"), Ordering::Less);
        assert_eq!(compare_versions("3.25.1", "3.25.1-rc.1"), Ordering::Greater);
    }

    #[test]
    fn minimum_checks() {
        assert!(satisfies_min_version("3.25.1", "3.20.0"));
        assert!(satisfies_min_version("3.25.1", "3.25.1"));
        assert!(!satisfies_min_version("3.19.0", "3.20.0"));
        assert!(same_version("v3.25.1", "3.25.1"));
    }
}
