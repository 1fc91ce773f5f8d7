//! Conversions between Pulumi's nonstandard `file:` URLs and pathnames.
//!
//! Pulumi accepts `file:` URLs that standard parsers reject: `file://./state`
//! means "directory `state` relative to here", `file://~/state` means a path
//! under the caller's home, and `file://myfile` is the relative name
//! `myfile`. The SMB-style `file://<server>/<share>` interpretation is not
//! supported; `localhost` and `127.0.0.1` hosts collapse to the local root.

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use url::Url;
use xpulumi_core::paths::{abs_join, expand_user, normalize_lexically};
use xpulumi_core::{Error, Result};

/// Lowercased scheme of a URL-shaped string, if it has one.
#[must_use]
pub fn url_scheme(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    if !chars.next()?.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

fn percent_decode(component: &str, url: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|_| Error::url(url, "percent-encoded bytes are not valid UTF-8"))
}

/// Resolve a `file:` URL to an absolute pathname.
///
/// Relative URLs are resolved against `cwd`. With `allow_relative` false, any
/// URL whose authority is not empty/`localhost`/`127.0.0.1` is rejected, which
/// forbids both relative and network forms.
pub fn file_url_to_pathname(url: &str, cwd: &Path, allow_relative: bool) -> Result<PathBuf> {
    if url_scheme(url).as_deref() != Some("file") {
        return Err(Error::url(url, "not a 'file:' URL"));
    }
    let rest = &url[url.find(':').map_or(0, |i| i + 1)..];
    let rest = rest.split(['#', '?']).next().unwrap_or("");

    let (netloc, path) = match rest.strip_prefix("//") {
        Some(after) => match after.find('/') {
            Some(idx) => (&after[..idx], &after[idx..]),
            None => (after, ""),
        },
        None => ("", rest),
    };

    let mut base_dir = percent_decode(netloc, url)?;
    if base_dir.is_empty() || base_dir == "localhost" || base_dir == "127.0.0.1" {
        base_dir = "/".to_string();
    }
    if !allow_relative && base_dir != "/" {
        return Err(Error::url(
            url,
            "relative and network-based 'file:' backends are not allowed",
        ));
    }

    let decoded_path = percent_decode(path, url)?;
    let trimmed = decoded_path.trim_start_matches('/');
    let combined = if trimmed.is_empty() {
        base_dir
    } else if base_dir.ends_with('/') {
        format!("{base_dir}{trimmed}")
    } else {
        format!("{base_dir}/{trimmed}")
    };

    let normalized = normalize_lexically(Path::new(&combined));
    let expanded = expand_user(&normalized.to_string_lossy());
    Ok(abs_join(cwd, &expanded))
}

/// Build a `file://` URL for a pathname, resolving relative paths against
/// `cwd`.
pub fn pathname_to_file_url(pathname: &Path, cwd: &Path) -> Result<String> {
    let absolute = abs_join(cwd, &expand_user(&pathname.to_string_lossy()));
    let url = Url::from_file_path(&absolute).map_err(|()| {
        Error::url(
            absolute.display().to_string(),
            "pathname cannot be expressed as a file: URL",
        )
    })?;
    Ok(url.to_string())
}
