//! Client for the `secret-kv` CLI.
//!
//! The Pulumi passphrase is never stored in config files; it lives in a
//! `secret-kv` vault and is fetched on demand with `secret-kv -r get <key>`.
//! Failures propagate with the subprocess's own exit code so callers can
//! abort the way a shell `|| exit $?` would.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use xpulumi_core::constants::PULUMI_PASSPHRASE_SECRET_KEY;
use xpulumi_core::{Error, Result};

/// Invokes the `secret-kv` executable found on `PATH` (or an explicit one).
#[derive(Debug, Clone)]
pub struct KvClient {
    program: PathBuf,
}

impl Default for KvClient {
    fn default() -> Self {
        Self::new()
    }
}

impl KvClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("secret-kv"),
        }
    }

    /// Use a specific executable instead of resolving `secret-kv` on `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Fetch a raw string value from the vault.
    ///
    /// Runs `secret-kv -r get <key>`; the `-r` flag makes the CLI print the
    /// value unquoted. Trailing newlines are stripped, matching what shell
    /// command substitution would capture.
    pub async fn get_string(&self, key: &str) -> Result<String> {
        let args = vec!["-r".to_string(), "get".to_string(), key.to_string()];
        debug!(key, "fetching secret from secret-kv");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::command_execution(
                    self.program.display().to_string(),
                    args.clone(),
                    format!("failed to spawn: {e}"),
                    None,
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => "secret-kv reported failure".to_string(),
                detail => detail.to_string(),
            };
            return Err(Error::command_execution(
                self.program.display().to_string(),
                args,
                message,
                output.status.code(),
            ));
        }

        let mut value = String::from_utf8_lossy(&output.stdout).into_owned();
        let stripped = value.trim_end_matches('\n').len();
        value.truncate(stripped);
        Ok(value)
    }

    /// The Pulumi passphrase stored under `pulumi/passphrase`.
    pub async fn pulumi_passphrase(&self) -> Result<String> {
        self.get_string(PULUMI_PASSPHRASE_SECRET_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_kv(tmp: &TempDir, script_body: &str) -> PathBuf {
        let path = tmp.path().join("secret-kv");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn fetches_and_strips_trailing_newline() {
        let tmp = TempDir::new().unwrap();
        let kv = fake_kv(&tmp, r#"echo "hunter2""#);
        let client = KvClient::new().with_program(kv);
        assert_eq!(client.get_string("pulumi/passphrase").await.unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn passes_raw_flag_and_key() {
        let tmp = TempDir::new().unwrap();
        let kv = fake_kv(&tmp, r#"printf '%s|' "$@""#);
        let client = KvClient::new().with_program(kv);
        assert_eq!(
            client.pulumi_passphrase().await.unwrap(),
            "-r|get|pulumi/passphrase|"
        );
    }

    #[tokio::test]
    async fn failure_carries_exit_code_and_stderr() {
        let tmp = TempDir::new().unwrap();
        let kv = fake_kv(&tmp, "echo 'no such key' >&2; exit 3");
        let client = KvClient::new().with_program(kv);
        let err = client.get_string("missing").await.unwrap_err();
        match err {
            Error::CommandExecution {
                exit_code, message, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(message, "no such key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let client = KvClient::new().with_program("/nonexistent/secret-kv");
        let err = client.get_string("k").await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
