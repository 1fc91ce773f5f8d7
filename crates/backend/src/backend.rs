//! Pulumi backend definitions and state access.
//!
//! A backend is where Pulumi keeps stack state: either the Pulumi service
//! (`https:`) or a DIY blob store (`file:`, `s3:`). Named backends are
//! described by a `backend.json` under `<infra>/backend/<name>/`; a raw URL
//! also works. Blob backends get one subdirectory per organization and
//! project, so many projects can share a single backend root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use xpulumi_config::XpulumiConfig;
use xpulumi_core::constants::{BACKEND_CONFIG_FILENAME, PULUMI_STANDARD_BACKEND};
use xpulumi_core::{fsutil, Error, Result, ResultExt};
use xpulumi_secrets::PassphraseCipher;

use crate::api::{PulumiApiClient, StackSummary};
use crate::context::Context;
use crate::fileurl::{file_url_to_pathname, pathname_to_file_url, url_scheme};
use crate::state::StackExport;

/// Relative location of stack state blobs under a project's backend URL.
const STACKS_SUBPATH: &str = ".pulumi/stacks";

/// The `options` member of `backend.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// The backend URL already identifies the organization, so project URLs
    /// must not append it. Forced on for the Pulumi service.
    pub includes_organization: bool,
    /// The backend URL already identifies the project.
    pub includes_project: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    /// `<project>:<stack>` of the xpulumi stack that provisions this
    /// backend's own infrastructure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_xstack: Option<String>,
}

/// On-disk shape of `backend.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub options: BackendOptions,
}

impl BackendConfig {
    #[must_use]
    pub fn path_in(backend_dir: &Path) -> PathBuf {
        backend_dir.join(BACKEND_CONFIG_FILENAME)
    }

    pub async fn load(backend_dir: &Path) -> Result<Self> {
        let path = Self::path_in(backend_dir);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::file_system(&path, "read", e))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid backend config '{}'", path.display()))
    }

    /// Write `backend.json` atomically, pretty-printed with sorted keys.
    pub fn save(&self, backend_dir: &Path) -> Result<()> {
        let value = serde_json::to_value(self)?;
        let text = format!("{}\n", serde_json::to_string_pretty(&value)?);
        fsutil::write_atomic_string(&Self::path_in(backend_dir), &text)
    }
}

/// A resolved backend: normalized URL plus the options that shape project
/// and stack URLs within it.
pub struct Backend {
    ctx: Arc<Context>,
    name: Option<String>,
    url: String,
    scheme: String,
    options: BackendOptions,
    includes_organization: bool,
    includes_project: bool,
    api: OnceCell<PulumiApiClient>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Load a named backend from `<infra>/backend/<name>/backend.json`.
    pub async fn from_name(ctx: Arc<Context>, name: &str) -> Result<Self> {
        let backend_dir = ctx.config().backend_dir(name);
        if !BackendConfig::path_in(&backend_dir).is_file() {
            return Err(Error::backend(
                name,
                format!(
                    "no backend definition at '{}'; create one with 'xpulumi backend create'",
                    backend_dir.display()
                ),
            ));
        }
        let config = BackendConfig::load(&backend_dir).await?;
        let url = config
            .uri
            .unwrap_or_else(|| PULUMI_STANDARD_BACKEND.to_string());
        Self::build(ctx, Some(name.to_string()), &url, config.options, &backend_dir)
    }

    /// Wrap a raw backend URL, resolved against the context's working
    /// directory.
    pub fn from_url(ctx: Arc<Context>, url: &str) -> Result<Self> {
        let base_dir = ctx.cwd().to_path_buf();
        Self::build(ctx, None, url, BackendOptions::default(), &base_dir)
    }

    fn build(
        ctx: Arc<Context>,
        name: Option<String>,
        url: &str,
        options: BackendOptions,
        base_dir: &Path,
    ) -> Result<Self> {
        let scheme = url_scheme(url).ok_or_else(|| Error::url(url, "missing URL scheme"))?;
        let url = match scheme.as_str() {
            // Relative file URLs are anchored at the backend's own directory
            // so a checkout can move without editing backend.json.
            "file" => {
                let pathname = file_url_to_pathname(url, base_dir, true)?;
                pathname_to_file_url(&pathname, base_dir)?
            }
            "http" | "https" => url.trim_end_matches('/').to_string(),
            _ => url.to_string(),
        };
        // The Pulumi service scopes URLs by account; DIY backends only do so
        // when the options say they do.
        let service = scheme == "https";
        let includes_organization = service || options.includes_organization;
        let includes_project = service || options.includes_project;
        debug!(%url, scheme, "resolved backend");
        Ok(Self {
            ctx,
            name,
            url,
            scheme,
            options,
            includes_organization,
            includes_project,
            api: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The backend name when it has one, otherwise its URL.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    #[must_use]
    pub fn includes_organization(&self) -> bool {
        self.includes_organization
    }

    #[must_use]
    pub fn includes_project(&self) -> bool {
        self.includes_project
    }

    #[must_use]
    pub fn default_organization(&self) -> Option<&str> {
        self.options.default_organization.as_deref()
    }

    /// `<project>:<stack>` that provisions this backend, if recorded.
    #[must_use]
    pub fn backend_xstack(&self) -> Option<&str> {
        self.options.backend_xstack.as_deref()
    }

    /// Whether state lives behind the Pulumi service REST API.
    #[must_use]
    pub fn is_service_backend(&self) -> bool {
        matches!(self.scheme.as_str(), "http" | "https")
    }

    /// Access token for this backend, or an error telling the user how to
    /// provide one.
    pub fn require_access_token(&self) -> Result<String> {
        self.ctx.pulumi_access_token(&self.url)?.ok_or_else(|| {
            Error::backend(
                self.display_name(),
                "no Pulumi access token; run 'pulumi login' or set PULUMI_ACCESS_TOKEN",
            )
        })
    }

    /// REST client for service backends, built once per backend.
    pub fn api_client(&self) -> Result<&PulumiApiClient> {
        if !self.is_service_backend() {
            return Err(Error::backend(
                self.display_name(),
                format!("scheme '{}' has no REST API", self.scheme),
            ));
        }
        self.api.get_or_try_init(|| {
            let token = self.require_access_token()?;
            PulumiApiClient::new(&self.url, token)
        })
    }

    fn resolve_organization(&self, organization: Option<&str>) -> Option<String> {
        organization
            .map(str::to_string)
            .or_else(|| self.options.default_organization.clone())
    }

    /// Organization to use for service API calls, falling back to the
    /// logged-in user's account.
    async fn service_organization(&self, organization: Option<&str>) -> Result<String> {
        if let Some(organization) = self.resolve_organization(organization) {
            return Ok(organization);
        }
        self.api_client()?.username().await
    }

    /// Root URL for one project's state within this backend.
    pub fn get_project_backend_url(
        &self,
        organization: Option<&str>,
        project: &str,
    ) -> Result<String> {
        let mut url = self.url.clone();
        if !self.includes_organization {
            let organization = self.resolve_organization(organization).ok_or_else(|| {
                Error::backend(
                    self.display_name(),
                    "an organization is required but none was given and the backend has no default",
                )
            })?;
            url.push('/');
            url.push_str(&organization);
        }
        if !self.includes_project {
            url.push('/');
            url.push_str(project);
        }
        Ok(url)
    }

    /// URL of the blob holding one stack's exported state.
    ///
    /// Only meaningful for blob backends; the service keeps state behind
    /// its API rather than at an addressable URL.
    pub fn get_stack_backend_url(
        &self,
        organization: Option<&str>,
        project: &str,
        stack: &str,
    ) -> Result<String> {
        if self.scheme == "https" {
            return Err(Error::backend(
                self.display_name(),
                "stack state URLs are not available for 'https' backends",
            ));
        }
        let project_url = self.get_project_backend_url(organization, project)?;
        Ok(format!("{project_url}/{STACKS_SUBPATH}/{stack}.json"))
    }

    /// Fetch a stack's deployment state, optionally decrypting passphrase
    /// secrets in place.
    pub async fn export_stack(
        &self,
        organization: Option<&str>,
        project: &str,
        stack: &str,
        decrypt_secrets: bool,
    ) -> Result<StackExport> {
        let export = if self.is_service_backend() {
            let organization = self.service_organization(organization).await?;
            let api = self.api_client()?;
            let value = match api
                .export_stack_deployment(&organization, project, stack, None)
                .await
            {
                Err(Error::Api { status: 404, .. }) => {
                    return Err(Error::StackNotFound {
                        stack: stack.to_string(),
                    })
                }
                other => other?,
            };
            StackExport::from_export_value(value, stack)?
        } else {
            let stack_url = self.get_stack_backend_url(organization, project, stack)?;
            let text = self
                .ctx
                .blob_store()
                .read_text(&stack_url)
                .await?
                .ok_or_else(|| Error::StackNotFound {
                    stack: stack.to_string(),
                })?;
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| Error::stack(stack, format!("invalid backend state JSON: {e}")))?;
            StackExport::from_checkpoint_value(value, stack)?
        };

        if !decrypt_secrets || !export.contains_encrypted_secrets() {
            return Ok(export);
        }
        self.decrypt_export(export, organization, project, stack)
            .await
    }

    async fn decrypt_export(
        &self,
        export: StackExport,
        organization: Option<&str>,
        project: &str,
        stack: &str,
    ) -> Result<StackExport> {
        match export.secrets_provider_type() {
            Some("passphrase") => {}
            Some(other) => {
                return Err(Error::unsupported(
                    "decrypt-secrets",
                    format!("cannot decrypt secrets managed by the '{other}' provider"),
                ))
            }
            None => {
                return Err(Error::cipher(
                    "deployment does not identify a secrets provider",
                ))
            }
        }
        let salt_state = export
            .passphrase_salt_state()
            .map(str::to_string)
            .ok_or_else(|| Error::cipher("passphrase provider has no salt state"))?;
        let passphrase = self
            .ctx
            .pulumi_secret_passphrase(
                Some(&self.url),
                organization,
                Some(project),
                Some(stack),
                Some(&salt_state),
            )
            .await?;
        let cipher = PassphraseCipher::from_salt_state(&passphrase, &salt_state)?;
        export.decrypt(&cipher)
    }

    /// Outputs of a stack's synthetic stack resource, with secrets either
    /// decrypted or masked as `[secret]`.
    pub async fn get_stack_outputs(
        &self,
        organization: Option<&str>,
        project: &str,
        stack: &str,
        decrypt_secrets: bool,
    ) -> Result<serde_json::Map<String, Value>> {
        let export = self
            .export_stack(organization, project, stack, decrypt_secrets)
            .await?;
        export.stack_outputs(stack)
    }

    /// Whether a stack has been created in this backend, deployed or not.
    pub async fn stack_is_inited(
        &self,
        organization: Option<&str>,
        project: &str,
        stack: &str,
    ) -> Result<bool> {
        match self.export_stack(organization, project, stack, false).await {
            Ok(_) | Err(Error::StackNotDeployed { .. }) => Ok(true),
            Err(Error::StackNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether a stack currently has deployed resources.
    pub async fn stack_is_deployed(
        &self,
        organization: Option<&str>,
        project: &str,
        stack: &str,
    ) -> Result<bool> {
        match self.export_stack(organization, project, stack, false).await {
            Ok(export) => Ok(export.resource_count().unwrap_or(0) > 0),
            Err(Error::StackNotFound { .. } | Error::StackNotDeployed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Names of the stacks a project has in this backend, sorted.
    pub async fn list_stack_names(
        &self,
        organization: Option<&str>,
        project: &str,
    ) -> Result<Vec<String>> {
        if self.is_service_backend() {
            let organization = self.service_organization(organization).await?;
            let api = self.api_client()?;
            let mut names: Vec<String> = api
                .list_stacks(Some(&organization), Some(project))
                .await?
                .into_iter()
                .map(|summary: StackSummary| summary.stack_name)
                .collect();
            names.sort();
            names.dedup();
            Ok(names)
        } else {
            let project_url = self.get_project_backend_url(organization, project)?;
            self.ctx
                .blob_store()
                .list_json_stems(&format!("{project_url}/{STACKS_SUBPATH}"))
                .await
        }
    }

    /// Make sure a project's area exists in a `file:` backend so a first
    /// `pulumi stack init` does not trip over a missing directory.
    pub async fn precreate_project_backend(
        &self,
        organization: Option<&str>,
        project: &str,
    ) -> Result<()> {
        if self.scheme != "file" {
            return Ok(());
        }
        let project_url = self.get_project_backend_url(organization, project)?;
        let dir = file_url_to_pathname(&project_url, self.ctx.cwd(), true)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::file_system(&dir, "create", e))?;
        Ok(())
    }
}

/// Names of the backends defined under `<infra>/backend/`, sorted.
pub async fn list_backend_names(config: &XpulumiConfig) -> Result<Vec<String>> {
    let dir = config.backend_infra_dir();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::file_system(&dir, "read", e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::file_system(&dir, "read", e))?
    {
        if BackendConfig::path_in(&entry.path()).is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xpulumi_config::{ConfigFormat, XpulumiConfig};
    use xpulumi_core::EnvironmentVariables;

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

    fn test_context(root: &Path, env: EnvironmentVariables) -> Arc<Context> {
        Arc::new(Context::new(test_config(root), root.to_path_buf(), env))
    }

    fn write_named_backend(root: &Path, name: &str, config: &BackendConfig) -> PathBuf {
        let dir = root.join("xpulumi.d/backend").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        config.save(&dir).unwrap();
        dir
    }

    fn local_options() -> BackendOptions {
        BackendOptions {
            includes_organization: false,
            includes_project: false,
            ..BackendOptions::default()
        }
    }

    #[tokio::test]
    async fn named_backend_absolutizes_relative_file_uri() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let dir = write_named_backend(
            root,
            "main",
            &BackendConfig {
                name: Some("main".to_string()),
                uri: Some("file://./state".to_string()),
                options: local_options(),
            },
        );

        let ctx = test_context(root, EnvironmentVariables::new());
        let backend = Backend::from_name(ctx, "main").await.unwrap();
        assert_eq!(backend.scheme(), "file");
        assert_eq!(
            backend.url(),
            pathname_to_file_url(&dir.join("state"), root).unwrap()
        );
        assert!(!backend.includes_organization());
    }

    #[tokio::test]
    async fn missing_uri_means_pulumi_service() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_named_backend(root, "cloud", &BackendConfig::default());

        let ctx = test_context(root, EnvironmentVariables::new());
        let backend = Backend::from_name(ctx, "cloud").await.unwrap();
        assert_eq!(backend.url(), PULUMI_STANDARD_BACKEND);
        assert!(backend.includes_organization());
        assert!(backend.includes_project());
    }

    #[tokio::test]
    async fn unknown_backend_name_is_reported() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), EnvironmentVariables::new());
        let err = Backend::from_name(ctx, "ghost").await.unwrap_err();
        assert!(err.to_string().contains("xpulumi backend create"));
    }

    #[tokio::test]
    async fn project_and_stack_urls_for_blob_backends() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), EnvironmentVariables::new());
        let backend = Backend::from_url(ctx, "s3://bucket/state").unwrap();

        let err = backend.get_project_backend_url(None, "vpc").unwrap_err();
        assert!(err.to_string().contains("organization is required"));

        assert_eq!(
            backend
                .get_project_backend_url(Some("g"), "vpc")
                .unwrap(),
            "s3://bucket/state/g/vpc"
        );
        assert_eq!(
            backend.get_stack_backend_url(Some("g"), "vpc", "dev").unwrap(),
            "s3://bucket/state/g/vpc/.pulumi/stacks/dev.json"
        );
    }

    #[tokio::test]
    async fn default_organization_fills_in() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_named_backend(
            root,
            "team",
            &BackendConfig {
                name: Some("team".to_string()),
                uri: Some("s3://bucket/state".to_string()),
                options: BackendOptions {
                    default_organization: Some("g".to_string()),
                    ..local_options()
                },
            },
        );

        let ctx = test_context(root, EnvironmentVariables::new());
        let backend = Backend::from_name(ctx, "team").await.unwrap();
        assert_eq!(
            backend.get_project_backend_url(None, "vpc").unwrap(),
            "s3://bucket/state/g/vpc"
        );
    }

    #[tokio::test]
    async fn service_backend_has_no_stack_urls() {
        let tmp = TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), EnvironmentVariables::new());
        let backend = Backend::from_url(ctx, "https://api.pulumi.com/").unwrap();
        assert_eq!(backend.url(), "https://api.pulumi.com");
        assert!(backend
            .get_stack_backend_url(None, "vpc", "dev")
            .is_err());
    }

    fn file_backend_with_stack(root: &Path, deployment: Value) -> (Arc<Context>, PathBuf) {
        let dir = write_named_backend(
            root,
            "main",
            &BackendConfig {
                name: Some("main".to_string()),
                uri: Some("file://./state".to_string()),
                options: local_options(),
            },
        );
        let stacks = dir.join("state/g/vpc/.pulumi/stacks");
        std::fs::create_dir_all(&stacks).unwrap();
        let checkpoint = json!({
            "version": 3,
            "checkpoint": {"stack": "dev", "latest": deployment},
        });
        std::fs::write(stacks.join("dev.json"), checkpoint.to_string()).unwrap();
        (test_context(root, EnvironmentVariables::new()), dir)
    }

    #[tokio::test]
    async fn exports_stack_from_file_backend() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _dir) = file_backend_with_stack(
            tmp.path(),
            json!({"resources": [{"type": "pulumi:pulumi:Stack", "outputs": {"x": 1}}]}),
        );

        let backend = Backend::from_name(ctx, "main").await.unwrap();
        let export = backend
            .export_stack(Some("g"), "vpc", "dev", false)
            .await
            .unwrap();
        assert_eq!(export.resource_count(), Some(1));
        assert!(backend.stack_is_inited(Some("g"), "vpc", "dev").await.unwrap());
        assert!(backend.stack_is_deployed(Some("g"), "vpc", "dev").await.unwrap());

        let missing = backend
            .export_stack(Some("g"), "vpc", "prod", false)
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::StackNotFound { .. }));
        assert!(!backend.stack_is_inited(Some("g"), "vpc", "prod").await.unwrap());

        assert_eq!(
            backend.list_stack_names(Some("g"), "vpc").await.unwrap(),
            vec!["dev"]
        );
    }

    #[tokio::test]
    async fn decrypts_passphrase_secrets_via_cached_passphrase() {
        let tmp = TempDir::new().unwrap();
        let cipher = PassphraseCipher::generate("hunter2");
        let salt_state = cipher.salt_state().unwrap();
        let secret = json!({
            "4dabf18193072939515e22adb298388d": "1b47061264138c4ac30d75fd1eb44270",
            "ciphertext": cipher.encrypt("\"classified\"").unwrap(),
        });
        let (ctx, _dir) = file_backend_with_stack(
            tmp.path(),
            json!({
                "secrets_providers": {
                    "type": "passphrase",
                    "state": {"salt": salt_state},
                },
                "resources": [{
                    "type": "pulumi:pulumi:Stack",
                    "outputs": {"token": secret},
                }],
            }),
        );
        ctx.set_pulumi_secret_passphrase("hunter2", None, None, None, None, Some(&salt_state));

        let backend = Backend::from_name(ctx, "main").await.unwrap();
        let outputs = backend
            .get_stack_outputs(Some("g"), "vpc", "dev", true)
            .await
            .unwrap();
        assert_eq!(outputs["token"], json!("classified"));

        let masked = backend
            .get_stack_outputs(Some("g"), "vpc", "dev", false)
            .await
            .unwrap();
        assert_eq!(masked["token"], json!("[secret]"));
    }

    #[tokio::test]
    async fn service_export_maps_404_to_stack_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stacks/g/vpc/dev/export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": 3,
                "deployment": {"resources": []},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stacks/g/vpc/ghost/export"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let env: EnvironmentVariables =
            [("PULUMI_ACCESS_TOKEN".to_string(), "pul-abc".to_string())]
                .into_iter()
                .collect();
        let ctx = test_context(tmp.path(), env);
        let backend = Backend::from_url(ctx, &server.uri()).unwrap();

        let export = backend
            .export_stack(Some("g"), "vpc", "dev", false)
            .await
            .unwrap();
        assert_eq!(export.resource_count(), Some(0));

        let err = backend
            .export_stack(Some("g"), "vpc", "ghost", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StackNotFound { .. }));
    }

    #[tokio::test]
    async fn lists_defined_backends() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_named_backend(root, "main", &BackendConfig::default());
        write_named_backend(root, "cloud", &BackendConfig::default());
        // A stray directory without backend.json is not a backend.
        std::fs::create_dir_all(root.join("xpulumi.d/backend/scratch")).unwrap();

        let config = test_config(root);
        assert_eq!(
            list_backend_names(&config).await.unwrap(),
            vec!["cloud", "main"]
        );
    }
}
