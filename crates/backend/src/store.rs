//! Blob access for file and S3 backends.
//!
//! State blobs are addressed by URL. `file:` URLs are read directly from
//! the filesystem; `s3:` URLs go through the `aws` CLI so no AWS SDK or
//! credential handling lives in this crate.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use xpulumi_core::{Error, Result};

use crate::fileurl::{file_url_to_pathname, url_scheme};

/// Invokes the `aws` executable found on `PATH` (or an explicit one).
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: PathBuf,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCli {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("aws"),
        }
    }

    /// Use a specific executable instead of resolving `aws` on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output> {
        debug!(args = %args.join(" "), "running aws CLI");
        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::command_execution(
                    self.program.display().to_string(),
                    args,
                    format!("failed to spawn: {e}"),
                    None,
                )
            })
    }

    fn failure(&self, args: Vec<String>, output: &std::process::Output) -> Error {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => "aws reported failure".to_string(),
            detail => detail.to_string(),
        };
        Error::command_execution(
            self.program.display().to_string(),
            args,
            message,
            output.status.code(),
        )
    }

    /// Download one S3 object, or `None` if it does not exist.
    ///
    /// Runs `aws s3 cp <url> -`. The CLI reports a missing key as a non-zero
    /// exit with a 404/NoSuchKey diagnostic on stderr.
    pub async fn s3_get_object(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let args = vec!["s3".to_string(), "cp".to_string(), url.to_string(), "-".to_string()];
        let output = self.run(args.clone()).await?;
        if output.status.success() {
            return Ok(Some(output.stdout));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("404")
            || stderr.contains("NoSuchKey")
            || stderr.contains("does not exist")
        {
            return Ok(None);
        }
        Err(self.failure(args, &output))
    }

    /// List the object keys directly under `prefix` in `bucket`.
    ///
    /// Runs `aws s3api list-objects-v2` with a `/` delimiter, so nested
    /// pseudo-directories are not descended into.
    pub async fn s3_list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let args = vec![
            "s3api".to_string(),
            "list-objects-v2".to_string(),
            "--bucket".to_string(),
            bucket.to_string(),
            "--prefix".to_string(),
            prefix.to_string(),
            "--delimiter".to_string(),
            "/".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let output = self.run(args.clone()).await?;
        if !output.status.success() {
            return Err(self.failure(args, &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            // Recent CLI versions print nothing at all for an empty listing.
            return Ok(Vec::new());
        }
        let listing: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| Error::network("s3api list-objects-v2", format!("bad listing JSON: {e}")))?;
        let mut keys = Vec::new();
        if let Some(contents) = listing.get("Contents").and_then(|v| v.as_array()) {
            for entry in contents {
                if let Some(key) = entry.get("Key").and_then(|v| v.as_str()) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}

/// Split `s3://bucket/key/path` into bucket and key.
pub fn split_s3_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| Error::url(url, "not an s3 URL"))?;
    let (bucket, key) = match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(Error::url(url, "missing bucket name"));
    }
    Ok((bucket.to_string(), key.to_string()))
}

/// Reads and enumerates backend state blobs addressed by URL.
#[derive(Debug, Clone)]
pub struct BlobStore {
    aws: AwsCli,
    cwd: PathBuf,
}

impl BlobStore {
    #[must_use]
    pub fn new(aws: AwsCli, cwd: impl Into<PathBuf>) -> Self {
        Self {
            aws,
            cwd: cwd.into(),
        }
    }

    /// Read one blob as text, or `None` if it does not exist.
    pub async fn read_text(&self, url: &str) -> Result<Option<String>> {
        match url_scheme(url).as_deref() {
            Some("file") => {
                let path = file_url_to_pathname(url, &self.cwd, true)?;
                self.read_file(&path).await
            }
            Some("s3") => match self.aws.s3_get_object(url).await? {
                Some(bytes) => String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|_| Error::url(url, "blob is not valid UTF-8")),
                None => Ok(None),
            },
            _ => Err(Error::unsupported(
                "blob-access",
                format!("cannot read blobs from URL '{url}'"),
            )),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::file_system(path, "read", e)),
        }
    }

    /// Names of `*.json` blobs directly under a directory URL, sorted.
    ///
    /// Pulumi backends keep one `<stack>.json` per stack in the stacks
    /// directory, along with `.bak` copies and attic files that are skipped
    /// here. A missing directory is an empty listing.
    pub async fn list_json_stems(&self, dir_url: &str) -> Result<Vec<String>> {
        let mut names = match url_scheme(dir_url).as_deref() {
            Some("file") => {
                let dir = file_url_to_pathname(dir_url, &self.cwd, true)?;
                self.list_dir_json(&dir).await?
            }
            Some("s3") => {
                let (bucket, mut prefix) = split_s3_url(dir_url)?;
                if !prefix.is_empty() && !prefix.ends_with('/') {
                    prefix.push('/');
                }
                self.aws
                    .s3_list_keys(&bucket, &prefix)
                    .await?
                    .into_iter()
                    .filter_map(|key| json_stem(key.rsplit('/').next().unwrap_or(&key)))
                    .collect()
            }
            _ => {
                return Err(Error::unsupported(
                    "blob-access",
                    format!("cannot list blobs under URL '{dir_url}'"),
                ))
            }
        };
        names.sort();
        Ok(names)
    }

    async fn list_dir_json(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::file_system(dir, "read", e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::file_system(dir, "read", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::file_system(entry.path(), "stat", e))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(stem) = json_stem(&entry.file_name().to_string_lossy()) {
                names.push(stem);
            }
        }
        Ok(names)
    }
}

fn json_stem(file_name: &str) -> Option<String> {
    file_name
        .strip_suffix(".json")
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}
