//! Minimal client for the Pulumi service REST API.
//!
//! Covers the handful of endpoints needed for cloud backends: identifying
//! the logged-in user, probing projects and stacks, exporting deployments,
//! and listing a project's stacks. Authentication is a bearer-style
//! `token <access-token>` header, the same credential `pulumi login` stores.

use std::time::Duration;

use once_cell::sync::OnceCell;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use xpulumi_core::{Error, Result};

/// Presented to the service so responses match what the real CLI receives.
const USER_AGENT: &str = "pulumi-cli/1 (v3.25.1; linux)";
const ACCEPT: &str = "application/vnd.pulumi+8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters escaped when an org/project/stack name lands in a URL path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// One stack as reported by `GET api/user/stacks`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub org_name: String,
    pub project_name: String,
    pub stack_name: String,
    /// Unix timestamp of the last update, absent for never-deployed stacks.
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub resource_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StackListResponse {
    #[serde(default)]
    stacks: Vec<StackSummary>,
}

/// Authenticated client bound to one service backend URL.
#[derive(Debug)]
pub struct PulumiApiClient {
    base_url: String,
    access_token: String,
    http: reqwest::Client,
    username: OnceCell<String>,
}

impl PulumiApiClient {
    pub fn new(backend_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::network(backend_url, format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: backend_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            http,
            username: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(%url, "pulumi api GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("Accept", ACCEPT)
            .header("Authorization", format!("token {}", self.access_token))
            .send()
            .await
            .map_err(|e| Error::network(&url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match body.trim() {
                "" => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
                detail => detail.to_string(),
            };
            return Err(Error::api(url, status.as_u16(), message));
        }
        response
            .json()
            .await
            .map_err(|e| Error::network(&url, format!("invalid JSON response: {e}")))
    }

    /// `true` for a 2xx HEAD response, `false` for 404.
    async fn head_exists(&self, path: &str) -> Result<bool> {
        let url = self.endpoint(path);
        debug!(%url, "pulumi api HEAD");
        let response = self
            .http
            .head(&url)
            .header("Accept", ACCEPT)
            .header("Authorization", format!("token {}", self.access_token))
            .send()
            .await
            .map_err(|e| Error::network(&url, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Error::api(
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ))
        }
    }

    /// `GET api/user`: account details for the token's owner.
    pub async fn user_info(&self) -> Result<Value> {
        self.get_json("api/user", &[]).await
    }

    /// GitHub login of the token's owner, cached after the first fetch. This
    /// doubles as the default organization on the Pulumi service.
    pub async fn username(&self) -> Result<String> {
        if let Some(name) = self.username.get() {
            return Ok(name.clone());
        }
        let info = self.user_info().await?;
        let name = info
            .get("githubLogin")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::network(
                    self.endpoint("api/user"),
                    "response has no 'githubLogin' member",
                )
            })?
            .to_string();
        let _ = self.username.set(name.clone());
        Ok(name)
    }

    fn stack_path(organization: &str, project: &str, stack: &str) -> String {
        format!(
            "api/stacks/{}/{}/{}",
            encode_segment(organization),
            encode_segment(project),
            encode_segment(stack)
        )
    }

    /// `HEAD api/stacks/{org}/{project}`.
    pub async fn project_exists(&self, organization: &str, project: &str) -> Result<bool> {
        let path = format!(
            "api/stacks/{}/{}",
            encode_segment(organization),
            encode_segment(project)
        );
        self.head_exists(&path).await
    }

    /// `HEAD api/stacks/{org}/{project}/{stack}`.
    pub async fn stack_exists(
        &self,
        organization: &str,
        project: &str,
        stack: &str,
    ) -> Result<bool> {
        self.head_exists(&Self::stack_path(organization, project, stack))
            .await
    }

    /// `GET api/stacks/{org}/{project}/{stack}/export[/{version}]`: the
    /// stack's deployment as a `{"version", "deployment"}` document.
    pub async fn export_stack_deployment(
        &self,
        organization: &str,
        project: &str,
        stack: &str,
        version: Option<u64>,
    ) -> Result<Value> {
        let mut path = format!("{}/export", Self::stack_path(organization, project, stack));
        if let Some(version) = version {
            path.push_str(&format!("/{version}"));
        }
        self.get_json(&path, &[]).await
    }

    /// `GET api/user/stacks?project=..`: stacks visible to the user,
    /// optionally filtered by organization and project.
    pub async fn list_stacks(
        &self,
        organization: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<StackSummary>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(organization) = organization {
            query.push(("organization", organization));
        }
        if let Some(project) = project {
            query.push(("project", project));
        }
        let value = self.get_json("api/user/stacks", &query).await?;
        let listing: StackListResponse = serde_json::from_value(value)
            .map_err(|e| {
                Error::network(
                    self.endpoint("api/user/stacks"),
                    format!("unexpected stack list shape: {e}"),
                )
            })?;
        Ok(listing.stacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PulumiApiClient {
        PulumiApiClient::new(&server.uri(), "pul-test-token").unwrap()
    }

    #[tokio::test]
    async fn username_sends_token_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user"))
            .and(header("Authorization", "token pul-test-token"))
            .and(header("Accept", ACCEPT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "githubLogin": "alice",
                "name": "Alice",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.username().await.unwrap(), "alice");
        // Second call must come from the cache; the mock allows one hit.
        assert_eq!(client.username().await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn export_hits_versioned_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stacks/alice/vpc/dev/export/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": 3,
                "deployment": {"resources": []},
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let value = client
            .export_stack_deployment("alice", "vpc", "dev", Some(7))
            .await
            .unwrap();
        assert_eq!(value["deployment"]["resources"], json!([]));
    }

    #[tokio::test]
    async fn export_missing_stack_is_an_api_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/stacks/alice/vpc/ghost/export"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 404,
                "message": "stack not found",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .export_stack_deployment("alice", "vpc", "ghost", None)
            .await
            .unwrap_err();
        match err {
            Error::Api { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn project_probe_maps_404_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/api/stacks/alice/vpc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/api/stacks/alice/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.project_exists("alice", "vpc").await.unwrap());
        assert!(!client.project_exists("alice", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn stack_listing_filters_by_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/stacks"))
            .and(query_param("project", "vpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stacks": [
                    {
                        "orgName": "alice",
                        "projectName": "vpc",
                        "stackName": "dev",
                        "lastUpdate": 1_650_000_000,
                        "resourceCount": 12,
                    },
                    {"orgName": "alice", "projectName": "vpc", "stackName": "prod"},
                ],
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stacks = client.list_stacks(None, Some("vpc")).await.unwrap();
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0].stack_name, "dev");
        assert_eq!(stacks[0].resource_count, Some(12));
        assert_eq!(stacks[1].last_update, None);
    }

    #[tokio::test]
    async fn names_are_escaped_in_paths() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/api/stacks/alice/my%20proj"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.project_exists("alice", "my proj").await.unwrap());
    }
}
