//! Shared runtime context: environment snapshot, working directory, and the
//! caches that keep passphrase and access-token lookups from repeating.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use xpulumi_config::XpulumiConfig;
use xpulumi_core::constants::{PULUMI_ACCESS_TOKEN_ENV_VAR, PULUMI_HOME_ENV_VAR};
use xpulumi_core::paths::{abs_join, expand_user};
use xpulumi_core::{EnvironmentVariables, Error, Result};
use xpulumi_secrets::{CredentialsFile, KvClient};

use crate::store::{AwsCli, BlobStore};

/// Cache key for passphrases scoped to a backend/org/project/stack, with
/// `None` slots acting as wildcard fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PassphraseScope {
    backend_url: Option<String>,
    organization: Option<String>,
    project: Option<String>,
    stack: Option<String>,
}

#[derive(Debug, Default)]
struct PassphraseCache {
    by_salt_state: HashMap<String, String>,
    by_scope: HashMap<PassphraseScope, String>,
}

/// Everything the backend, project, and stack layers share.
///
/// Cheap to clone behind an [`Arc`]; all interior caches are synchronized.
pub struct Context {
    config: Arc<XpulumiConfig>,
    cwd: PathBuf,
    env: EnvironmentVariables,
    kv: KvClient,
    aws: AwsCli,
    passphrases: Mutex<PassphraseCache>,
    access_tokens: Mutex<HashMap<String, (Option<String>, Option<String>)>>,
    credentials: OnceCell<Option<CredentialsFile>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cwd", &self.cwd)
            .field("config_file", &self.config.config_file)
            .finish_non_exhaustive()
    }
}

impl Context {
    #[must_use]
    pub fn new(config: Arc<XpulumiConfig>, cwd: PathBuf, env: EnvironmentVariables) -> Self {
        Self {
            config,
            cwd,
            env,
            kv: KvClient::new(),
            aws: AwsCli::new(),
            passphrases: Mutex::new(PassphraseCache::default()),
            access_tokens: Mutex::new(HashMap::new()),
            credentials: OnceCell::new(),
        }
    }

    /// Substitute the `secret-kv` client, e.g. to point tests at a fake.
    #[must_use]
    pub fn with_kv_client(mut self, kv: KvClient) -> Self {
        self.kv = kv;
        self
    }

    /// Substitute the `aws` CLI wrapper, e.g. to point tests at a fake.
    #[must_use]
    pub fn with_aws_cli(mut self, aws: AwsCli) -> Self {
        self.aws = aws;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Arc<XpulumiConfig> {
        &self.config
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    #[must_use]
    pub fn env(&self) -> &EnvironmentVariables {
        &self.env
    }

    #[must_use]
    pub fn kv(&self) -> &KvClient {
        &self.kv
    }

    #[must_use]
    pub fn aws(&self) -> &AwsCli {
        &self.aws
    }

    /// Blob reader rooted at this context's working directory.
    #[must_use]
    pub fn blob_store(&self) -> BlobStore {
        BlobStore::new(self.aws.clone(), self.cwd.clone())
    }

    /// Resolve a possibly relative, possibly `~`-prefixed path against this
    /// context's working directory.
    #[must_use]
    pub fn abspath(&self, pathname: &str) -> PathBuf {
        abs_join(&self.cwd, &expand_user(pathname))
    }

    /// `PULUMI_HOME` for wrapped invocations: the environment wins if set and
    /// non-empty, otherwise the configured project-local home.
    #[must_use]
    pub fn pulumi_home(&self) -> PathBuf {
        match self.env.get(PULUMI_HOME_ENV_VAR) {
            Some(v) if !v.is_empty() => self.abspath(v),
            _ => self.config.pulumi_home.clone(),
        }
    }

    #[must_use]
    pub fn pulumi_bin_dir(&self) -> PathBuf {
        self.pulumi_home().join("bin")
    }

    /// The Pulumi executable: the project-local install if present, falling
    /// back to whatever is on `PATH`.
    pub fn pulumi_cli(&self) -> Result<PathBuf> {
        let local = self.pulumi_bin_dir().join("pulumi");
        if local.is_file() {
            return Ok(local);
        }
        which::which("pulumi")
            .map_err(|_| Error::install("pulumi CLI not installed; run 'xpulumi install-pulumi'"))
    }

    /// Access token for a backend URL: `PULUMI_ACCESS_TOKEN` from the
    /// environment (empty meaning unset), then `credentials.json`.
    pub fn pulumi_access_token(&self, backend_url: &str) -> Result<Option<String>> {
        Ok(self.access_token_and_username(backend_url)?.0)
    }

    /// Username recorded for a backend URL in `credentials.json`, if any.
    pub fn pulumi_cred_username(&self, backend_url: &str) -> Result<Option<String>> {
        Ok(self.access_token_and_username(backend_url)?.1)
    }

    fn access_token_and_username(
        &self,
        backend_url: &str,
    ) -> Result<(Option<String>, Option<String>)> {
        if let Some(entry) = self.access_tokens.lock().get(backend_url) {
            return Ok(entry.clone());
        }

        let mut token = self
            .env
            .get(PULUMI_ACCESS_TOKEN_ENV_VAR)
            .filter(|v| !v.is_empty())
            .cloned();
        let mut username = None;
        if token.is_none() {
            if let Some(creds) = self.credentials()? {
                token = creds.access_token(backend_url).map(str::to_string);
                username = creds.username(backend_url).map(str::to_string);
            }
        }

        let entry = (token, username);
        self.access_tokens
            .lock()
            .insert(backend_url.to_string(), entry.clone());
        Ok(entry)
    }

    fn credentials(&self) -> Result<&Option<CredentialsFile>> {
        self.credentials
            .get_or_try_init(|| CredentialsFile::load(&self.pulumi_home()))
    }

    /// Cache a passphrase under every applicable key.
    pub fn set_pulumi_secret_passphrase(
        &self,
        passphrase: &str,
        backend_url: Option<&str>,
        organization: Option<&str>,
        project: Option<&str>,
        stack: Option<&str>,
        salt_state: Option<&str>,
    ) {
        let mut cache = self.passphrases.lock();
        if let Some(salt_state) = salt_state {
            cache
                .by_salt_state
                .insert(salt_state.to_string(), passphrase.to_string());
        }
        cache.by_scope.insert(
            scope(backend_url, organization, project, stack),
            passphrase.to_string(),
        );
    }

    /// Find the passphrase for a stack's secrets.
    ///
    /// Checks the caches from the most specific scope to the least, and only
    /// then falls back to the `secret-kv` vault. A vault failure propagates,
    /// carrying the subprocess exit code.
    pub async fn pulumi_secret_passphrase(
        &self,
        backend_url: Option<&str>,
        organization: Option<&str>,
        project: Option<&str>,
        stack: Option<&str>,
        salt_state: Option<&str>,
    ) -> Result<String> {
        if let Some(found) =
            self.cached_passphrase(backend_url, organization, project, stack, salt_state)
        {
            return Ok(found);
        }

        debug!(?backend_url, ?project, ?stack, "passphrase not cached, asking secret-kv");
        let passphrase = self.kv.pulumi_passphrase().await?;

        let mut cache = self.passphrases.lock();
        cache
            .by_scope
            .entry(scope(backend_url, organization, project, stack))
            .or_insert_with(|| passphrase.clone());
        if let Some(salt_state) = salt_state {
            cache
                .by_salt_state
                .entry(salt_state.to_string())
                .or_insert_with(|| passphrase.clone());
        }
        Ok(passphrase)
    }

    fn cached_passphrase(
        &self,
        backend_url: Option<&str>,
        organization: Option<&str>,
        project: Option<&str>,
        stack: Option<&str>,
        salt_state: Option<&str>,
    ) -> Option<String> {
        let cache = self.passphrases.lock();
        if let Some(salt_state) = salt_state {
            if let Some(found) = cache.by_salt_state.get(salt_state) {
                return Some(found.clone());
            }
        }
        let mut probes = vec![scope(backend_url, organization, project, stack)];
        if stack.is_some() {
            probes.push(scope(backend_url, organization, project, None));
        }
        if project.is_some() {
            probes.push(scope(backend_url, organization, None, None));
        }
        if organization.is_some() {
            probes.push(scope(backend_url, None, None, None));
        }
        if backend_url.is_some() {
            probes.push(scope(None, None, None, None));
        }
        probes
            .iter()
            .find_map(|probe| cache.by_scope.get(probe).cloned())
    }
}

fn scope(
    backend_url: Option<&str>,
    organization: Option<&str>,
    project: Option<&str>,
    stack: Option<&str>,
) -> PassphraseScope {
    PassphraseScope {
        backend_url: backend_url.map(str::to_string),
        organization: organization.map(str::to_string),
        project: project.map(str::to_string),
        stack: stack.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use xpulumi_config::ConfigFormat;

    fn test_config(root: &Path) -> Arc<XpulumiConfig> {
        Arc::new(XpulumiConfig {
            config_file: root.join("xpulumi.d/xpulumi.json"),
            format: ConfigFormat::Json,
            xpulumi_dir: root.join("xpulumi.d"),
            project_root_dir: root.to_path_buf(),
            pulumi_home: root.join("xpulumi.d/.pulumi"),
            default_backend_name: None,
            default_stack_name: None,
            pulumi_version: None,
        })
    }

    fn test_context(root: &Path, env: EnvironmentVariables) -> Context {
        Context::new(test_config(root), root.to_path_buf(), env)
    }

    #[test]
    fn pulumi_home_prefers_nonempty_env() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let ctx = test_context(root, EnvironmentVariables::new());
        assert_eq!(ctx.pulumi_home(), root.join("xpulumi.d/.pulumi"));

        let env: EnvironmentVariables =
            [(PULUMI_HOME_ENV_VAR.to_string(), "/opt/pulumi".to_string())]
                .into_iter()
                .collect();
        let ctx = test_context(root, env);
        assert_eq!(ctx.pulumi_home(), PathBuf::from("/opt/pulumi"));

        let env: EnvironmentVariables = [(PULUMI_HOME_ENV_VAR.to_string(), String::new())]
            .into_iter()
            .collect();
        let ctx = test_context(root, env);
        assert_eq!(ctx.pulumi_home(), root.join("xpulumi.d/.pulumi"));
    }

    #[test]
    fn access_token_env_overrides_credentials() {
        let tmp = TempDir::new().unwrap();
        let env: EnvironmentVariables =
            [(PULUMI_ACCESS_TOKEN_ENV_VAR.to_string(), "pul-env".to_string())]
                .into_iter()
                .collect();
        let ctx = test_context(tmp.path(), env);
        assert_eq!(
            ctx.pulumi_access_token("https://api.pulumi.com").unwrap(),
            Some("pul-env".to_string())
        );
    }

    #[test]
    fn access_token_from_credentials_file() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("xpulumi.d/.pulumi");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(
            home.join("credentials.json"),
            r#"{"accounts": {"https://api.pulumi.com": {"accessToken": "pul-file", "username": "bob"}}}"#,
        )
        .unwrap();

        let ctx = test_context(tmp.path(), EnvironmentVariables::new());
        assert_eq!(
            ctx.pulumi_access_token("https://api.pulumi.com").unwrap(),
            Some("pul-file".to_string())
        );
        assert_eq!(
            ctx.pulumi_cred_username("https://api.pulumi.com").unwrap(),
            Some("bob".to_string())
        );
        assert_eq!(ctx.pulumi_access_token("https://elsewhere").unwrap(), None);
    }

    #[tokio::test]
    async fn passphrase_scope_fallback_chain() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), EnvironmentVariables::new());

        // Seed only the backend-wide slot; a stack-specific lookup should
        // fall back to it without consulting secret-kv.
        ctx.set_pulumi_secret_passphrase("hunter2", Some("file:///be"), None, None, None, None);
        let found = ctx
            .pulumi_secret_passphrase(Some("file:///be"), Some("g"), Some("vpc"), Some("dev"), None)
            .await
            .unwrap();
        assert_eq!(found, "hunter2");
    }

    #[tokio::test]
    async fn salt_state_cache_wins() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), EnvironmentVariables::new());

        ctx.set_pulumi_secret_passphrase("by-scope", Some("file:///be"), None, None, None, None);
        ctx.set_pulumi_secret_passphrase("by-salt", None, None, None, None, Some("v1:AbCd:xyz"));
        let found = ctx
            .pulumi_secret_passphrase(Some("file:///be"), None, None, None, Some("v1:AbCd:xyz"))
            .await
            .unwrap();
        assert_eq!(found, "by-salt");
    }

    #[tokio::test]
    async fn passphrase_falls_back_to_kv_and_caches() {
        let tmp = TempDir::new().unwrap();
        let kv_path = tmp.path().join("secret-kv");
        // Counts invocations so the test can prove the cache short-circuits.
        std::fs::write(
            &kv_path,
            "#!/bin/sh\necho run >> \"$(dirname \"$0\")/calls\"\necho vault-pass\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&kv_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&kv_path, perms).unwrap();

        let ctx = test_context(tmp.path(), EnvironmentVariables::new())
            .with_kv_client(KvClient::new().with_program(&kv_path));

        let first = ctx
            .pulumi_secret_passphrase(Some("file:///be"), None, Some("vpc"), Some("dev"), None)
            .await
            .unwrap();
        let second = ctx
            .pulumi_secret_passphrase(Some("file:///be"), None, Some("vpc"), Some("dev"), None)
            .await
            .unwrap();
        assert_eq!(first, "vault-pass");
        assert_eq!(second, "vault-pass");

        let calls = std::fs::read_to_string(tmp.path().join("calls")).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }
}
