//! Pulumi's `credentials.json`, written by `pulumi login`.
//!
//! Lives at `<PULUMI_HOME>/credentials.json` and maps backend URLs to access
//! tokens. Only cloud backends have entries; local file backends never touch
//! this file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use xpulumi_core::{Error, Result, ResultExt};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsFile {
    /// Backend URL of the most recent `pulumi login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,

    /// Legacy token map, still written alongside `accounts`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub access_tokens: HashMap<String, String>,

    /// Per-backend account records.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub accounts: HashMap<String, Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<String>,
}

impl CredentialsFile {
    /// Where the file lives for a given `PULUMI_HOME`.
    #[must_use]
    pub fn path_in(pulumi_home: &Path) -> PathBuf {
        pulumi_home.join("credentials.json")
    }

    /// Load credentials if the file exists; `Ok(None)` when it does not.
    pub fn load(pulumi_home: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(pulumi_home);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::file_system(&path, "read", e)),
        };
        let parsed: Self = serde_json::from_str(&text)
            .with_context(|| format!("invalid credentials file {}", path.display()))?;
        Ok(Some(parsed))
    }

    /// Access token for a backend URL, preferring the `accounts` record.
    #[must_use]
    pub fn access_token(&self, backend_url: &str) -> Option<&str> {
        self.accounts
            .get(backend_url)
            .map(|a| a.access_token.as_str())
            .or_else(|| self.access_tokens.get(backend_url).map(String::as_str))
    }

    /// Logged-in username for a backend URL, if recorded.
    #[must_use]
    pub fn username(&self, backend_url: &str) -> Option<&str> {
        self.accounts
            .get(backend_url)?
            .username
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "current": "https://api.pulumi.com",
        "accessTokens": {
            "https://api.pulumi.com": "pul-legacy"
        },
        "accounts": {
            "https://api.pulumi.com": {
                "accessToken": "pul-current",
                "username": "alice",
                "organizations": ["alice", "acme"]
            }
        }
    }"#;

    #[test]
    fn loads_and_prefers_account_token() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("credentials.json"), SAMPLE).unwrap();

        let creds = CredentialsFile::load(tmp.path()).unwrap().unwrap();
        assert_eq!(creds.current.as_deref(), Some("https://api.pulumi.com"));
        assert_eq!(
            creds.access_token("https://api.pulumi.com"),
            Some("pul-current")
        );
        assert_eq!(creds.username("https://api.pulumi.com"), Some("alice"));
        assert_eq!(creds.access_token("https://other.example.com"), None);
    }

    #[test]
    fn falls_back_to_legacy_token_map() {
        let creds: CredentialsFile = serde_json::from_str(
            r#"{"accessTokens": {"https://api.example.com": "pul-old"}}"#,
        )
        .unwrap();
        assert_eq!(creds.access_token("https://api.example.com"), Some("pul-old"));
    }

    #[test]
    fn missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(CredentialsFile::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("credentials.json"), "not json").unwrap();
        let err = CredentialsFile::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("invalid credentials file"));
    }
}
