//! Exported stack deployment state and the secret wrappers inside it.
//!
//! Pulumi marks secrets in deployment JSON with a magic property pair plus
//! either a `ciphertext` (still encrypted) or `plaintext` (decrypted) field.
//! Blob backends store a checkpoint wrapper around the deployment; the
//! service API returns the deployment directly.

use serde_json::{json, Map, Value};
use xpulumi_core::constants::{
    PULUMI_JSON_SECRET_PROPERTY_NAME, PULUMI_JSON_SECRET_PROPERTY_VALUE,
    PULUMI_STACK_RESOURCE_TYPE, SECRET_MASK,
};
use xpulumi_core::{Error, Result};
use xpulumi_secrets::PassphraseCipher;

/// A stack deployment as produced by `pulumi stack export`.
#[derive(Debug, Clone)]
pub struct StackExport {
    pub version: Option<i64>,
    pub deployment: Value,
}

impl StackExport {
    /// Accept an `{"version": .., "deployment": ..}` document, as returned by
    /// the service REST API.
    pub fn from_export_value(value: Value, stack: &str) -> Result<Self> {
        match value {
            Value::Object(mut map) => {
                let deployment = map.remove("deployment").ok_or_else(|| {
                    Error::stack(stack, "export data has no 'deployment' member")
                })?;
                let version = map.get("version").and_then(Value::as_i64);
                Ok(Self {
                    version,
                    deployment,
                })
            }
            _ => Err(Error::stack(stack, "export data is not a JSON object")),
        }
    }

    /// Unwrap a blob backend's checkpoint file
    /// (`{"version": .., "checkpoint": {"stack": .., "latest": ..}}`).
    pub fn from_checkpoint_value(value: Value, stack: &str) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::stack(stack, "malformed backend state file"))?;
        let version = map.get("version").and_then(Value::as_i64);
        let checkpoint = map
            .get("checkpoint")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::stack(stack, "malformed backend state file"))?;

        if let Some(checkpoint_stack) = checkpoint.get("stack").and_then(Value::as_str) {
            if checkpoint_stack != stack {
                return Err(Error::stack(
                    stack,
                    format!("backend checkpoint belongs to stack '{checkpoint_stack}'"),
                ));
            }
        }
        match checkpoint.get("latest") {
            None | Some(Value::Null) => Err(Error::StackNotDeployed {
                stack: stack.to_string(),
            }),
            Some(latest @ Value::Object(_)) => Ok(Self {
                version,
                deployment: latest.clone(),
            }),
            Some(_) => Err(Error::stack(stack, "malformed backend state file")),
        }
    }

    /// Render back to the `{"version", "deployment"}` shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self.version {
            Some(version) => json!({ "version": version, "deployment": self.deployment }),
            None => json!({ "deployment": self.deployment }),
        }
    }

    /// Secrets provider type recorded in the deployment, e.g. `passphrase`
    /// or `service`.
    #[must_use]
    pub fn secrets_provider_type(&self) -> Option<&str> {
        self.deployment
            .get("secrets_providers")?
            .get("type")?
            .as_str()
    }

    /// Salt state of a passphrase secrets provider.
    #[must_use]
    pub fn passphrase_salt_state(&self) -> Option<&str> {
        self.deployment
            .get("secrets_providers")?
            .get("state")?
            .get("salt")?
            .as_str()
    }

    /// Whether any encrypted secret wrapper remains anywhere in the state.
    #[must_use]
    pub fn contains_encrypted_secrets(&self) -> bool {
        value_contains_encrypted_secrets(&self.deployment)
    }

    /// Number of resources in the deployment, if the state records them.
    #[must_use]
    pub fn resource_count(&self) -> Option<usize> {
        Some(self.deployment.get("resources")?.as_array()?.len())
    }

    /// Timestamp of the deployment's manifest, if present.
    #[must_use]
    pub fn manifest_time(&self) -> Option<&str> {
        self.deployment.get("manifest")?.get("time")?.as_str()
    }

    /// Replace every `ciphertext` secret wrapper with its `plaintext` form.
    pub fn decrypt(self, cipher: &PassphraseCipher) -> Result<Self> {
        Ok(Self {
            version: self.version,
            deployment: decrypt_value(self.deployment, cipher)?,
        })
    }

    /// Outputs of the synthetic `pulumi:pulumi:Stack` resource.
    ///
    /// Secret wrappers at the top level are flattened: still-encrypted ones
    /// become the `[secret]` mask, decrypted ones are parsed back out of
    /// their JSON plaintext.
    pub fn stack_outputs(&self, stack: &str) -> Result<Map<String, Value>> {
        let resources = self
            .deployment
            .get("resources")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::stack(stack, "deployment has no resource list"))?;
        let stack_resource = resources
            .iter()
            .find(|r| {
                r.get("type").and_then(Value::as_str) == Some(PULUMI_STACK_RESOURCE_TYPE)
            })
            .ok_or_else(|| Error::stack(stack, "no stack resource in deployment state"))?;
        let outputs = stack_resource
            .get("outputs")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::stack(stack, "malformed outputs in deployment state"))?;

        let mut result = Map::new();
        for (key, value) in outputs {
            result.insert(key.clone(), flatten_secret_output(value, stack)?);
        }
        Ok(result)
    }
}

fn is_secret_wrapper(map: &Map<String, Value>) -> bool {
    map.get(PULUMI_JSON_SECRET_PROPERTY_NAME)
        .and_then(Value::as_str)
        == Some(PULUMI_JSON_SECRET_PROPERTY_VALUE)
}

fn value_contains_encrypted_secrets(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(value_contains_encrypted_secrets),
        Value::Object(map) => {
            if is_secret_wrapper(map) && map.contains_key("ciphertext") {
                return true;
            }
            map.values().any(value_contains_encrypted_secrets)
        }
        _ => false,
    }
}

fn decrypt_value(value: Value, cipher: &PassphraseCipher) -> Result<Value> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|v| decrypt_value(v, cipher))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            if is_secret_wrapper(&map) && map.contains_key("ciphertext") {
                let ciphertext = map
                    .get("ciphertext")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::cipher("secret ciphertext is not a string"))?;
                let plaintext = cipher.decrypt(ciphertext)?;
                let mut out = Map::new();
                out.insert(
                    PULUMI_JSON_SECRET_PROPERTY_NAME.to_string(),
                    Value::String(PULUMI_JSON_SECRET_PROPERTY_VALUE.to_string()),
                );
                out.insert("plaintext".to_string(), Value::String(plaintext));
                Ok(Value::Object(out))
            } else {
                map.into_iter()
                    .map(|(k, v)| Ok((k, decrypt_value(v, cipher)?)))
                    .collect::<Result<Map<_, _>>>()
                    .map(Value::Object)
            }
        }
        other => Ok(other),
    }
}

fn flatten_secret_output(value: &Value, stack: &str) -> Result<Value> {
    if let Value::Object(map) = value {
        if is_secret_wrapper(map) {
            if map.contains_key("ciphertext") {
                return Ok(Value::String(SECRET_MASK.to_string()));
            }
            if let Some(plaintext) = map.get("plaintext") {
                let text = plaintext.as_str().ok_or_else(|| {
                    Error::stack(stack, "secret plaintext is not a string")
                })?;
                return serde_json::from_str(text).map_err(|_| {
                    Error::stack(stack, "secret plaintext is not valid JSON")
                });
            }
        }
    }
    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(ciphertext: &str) -> Value {
        json!({
            PULUMI_JSON_SECRET_PROPERTY_NAME: PULUMI_JSON_SECRET_PROPERTY_VALUE,
            "ciphertext": ciphertext,
        })
    }

    fn checkpoint(latest: Value) -> Value {
        json!({
            "version": 3,
            "checkpoint": { "stack": "dev", "latest": latest },
        })
    }

    #[test]
    fn checkpoint_unwraps_latest() {
        let export =
            StackExport::from_checkpoint_value(checkpoint(json!({"resources": []})), "dev")
                .unwrap();
        assert_eq!(export.version, Some(3));
        assert_eq!(export.resource_count(), Some(0));
    }

    #[test]
    fn checkpoint_stack_mismatch_is_an_error() {
        let err = StackExport::from_checkpoint_value(checkpoint(json!({})), "prod").unwrap_err();
        assert!(err.to_string().contains("belongs to stack 'dev'"));
    }

    #[test]
    fn missing_latest_means_not_deployed() {
        let state = json!({"version": 3, "checkpoint": {"stack": "dev"}});
        let err = StackExport::from_checkpoint_value(state, "dev").unwrap_err();
        assert!(matches!(err, Error::StackNotDeployed { .. }));
    }

    #[test]
    fn detects_encrypted_secrets_anywhere() {
        let export = StackExport {
            version: Some(3),
            deployment: json!({
                "resources": [ { "outputs": { "deep": [ secret("v1:a:b") ] } } ],
            }),
        };
        assert!(export.contains_encrypted_secrets());

        let clean = StackExport {
            version: Some(3),
            deployment: json!({"resources": [{"outputs": {"x": 1}}]}),
        };
        assert!(!clean.contains_encrypted_secrets());
    }

    #[test]
    fn outputs_mask_encrypted_and_parse_decrypted() {
        let export = StackExport {
            version: Some(3),
            deployment: json!({
                "resources": [
                    { "type": "aws:s3/bucket:Bucket", "outputs": {} },
                    {
                        "type": PULUMI_STACK_RESOURCE_TYPE,
                        "outputs": {
                            "plain": "hello",
                            "hidden": secret("v1:a:b"),
                            "revealed": {
                                PULUMI_JSON_SECRET_PROPERTY_NAME: PULUMI_JSON_SECRET_PROPERTY_VALUE,
                                "plaintext": "{\"user\":\"admin\"}",
                            },
                        },
                    },
                ],
            }),
        };
        let outputs = export.stack_outputs("dev").unwrap();
        assert_eq!(outputs["plain"], json!("hello"));
        assert_eq!(outputs["hidden"], json!(SECRET_MASK));
        assert_eq!(outputs["revealed"], json!({"user": "admin"}));
    }

    #[test]
    fn missing_stack_resource_is_an_error() {
        let export = StackExport {
            version: None,
            deployment: json!({"resources": []}),
        };
        let err = export.stack_outputs("dev").unwrap_err();
        assert!(err.to_string().contains("no stack resource"));
    }

    #[test]
    fn decrypt_walk_round_trip() {
        let cipher = PassphraseCipher::generate("pw");
        let encrypted = cipher.encrypt("\"classified\"").unwrap();
        let export = StackExport {
            version: Some(3),
            deployment: json!({
                "secrets_providers": {"type": "passphrase", "state": {"salt": "v1:x:y"}},
                "resources": [{
                    "type": PULUMI_STACK_RESOURCE_TYPE,
                    "outputs": { "token": secret(&encrypted) },
                }],
            }),
        };
        let decrypted = export.decrypt(&cipher).unwrap();
        assert!(!decrypted.contains_encrypted_secrets());
        let outputs = decrypted.stack_outputs("dev").unwrap();
        assert_eq!(outputs["token"], json!("classified"));
    }
}
