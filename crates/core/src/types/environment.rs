//! Environment-related types for domain-specific operations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Wrapper type for environment variables with domain-specific operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariables(HashMap<String, String>);

impl EnvironmentVariables {
    /// Create a new empty environment
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Create from an existing HashMap
    #[must_use]
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    /// Snapshot the current process environment
    #[must_use]
    pub fn from_os() -> Self {
        Self(std::env::vars().collect())
    }

    /// Insert a variable, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a variable by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    /// Remove a variable, returning its value if present
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Check if a variable exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Check if a variable is set to a nonempty value.
    ///
    /// Pulumi and xpulumi both treat the empty string the same as unset.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Prepend `dir` to a search-path variable, removing any existing
    /// occurrence of `dir` so repeated derivation stays idempotent.
    pub fn prepend_path(&mut self, key: &str, dir: &str) {
        let existing = self.0.get(key).cloned().unwrap_or_default();
        let mut parts: Vec<&str> = existing.split(':').filter(|p| !p.is_empty()).collect();
        parts.retain(|p| *p != dir);
        let joined = if parts.is_empty() {
            dir.to_string()
        } else {
            format!("{dir}:{}", parts.join(":"))
        };
        self.0.insert(key.to_string(), joined);
    }

    /// Merge another set of environment variables into this one.
    /// Variables in `other` will overwrite existing ones.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Get the number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get an iterator over the variables
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Consume and return the underlying map
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }

    /// Borrow the underlying map
    #[must_use]
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl Deref for EnvironmentVariables {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EnvironmentVariables {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<HashMap<String, String>> for EnvironmentVariables {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for EnvironmentVariables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for EnvironmentVariables {
    type Item = (String, String);
    type IntoIter = std::collections::hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for EnvironmentVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.0.keys().collect();
        keys.sort();
        for key in keys {
            writeln!(f, "{}={}", key, self.0[key])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_treats_empty_as_unset() {
        let mut env = EnvironmentVariables::new();
        assert!(!env.is_truthy("XPULUMI_RAW_PULUMI"));
        env.insert("XPULUMI_RAW_PULUMI", "");
        assert!(!env.is_truthy("XPULUMI_RAW_PULUMI"));
        env.insert("XPULUMI_RAW_PULUMI", "1");
        assert!(env.is_truthy("XPULUMI_RAW_PULUMI"));
    }

    #[test]
    fn prepend_path_deduplicates() {
        let mut env = EnvironmentVariables::new();
        env.insert("PATH", "/usr/bin:/bin");
        env.prepend_path("PATH", "/opt/pulumi/bin");
        assert_eq!(env.get("PATH").unwrap(), "/opt/pulumi/bin:/usr/bin:/bin");

        // prepending again must not grow the path
        env.prepend_path("PATH", "/opt/pulumi/bin");
        assert_eq!(env.get("PATH").unwrap(), "/opt/pulumi/bin:/usr/bin:/bin");
    }

    #[test]
    fn prepend_path_handles_missing_variable() {
        let mut env = EnvironmentVariables::new();
        env.prepend_path("PATH", "/opt/pulumi/bin");
        assert_eq!(env.get("PATH").unwrap(), "/opt/pulumi/bin");
    }
}
