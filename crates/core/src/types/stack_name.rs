//! Stack naming types.
//!
//! An xpulumi stack is addressed as `<project>:<stack>`. Either half may be
//! omitted on the command line, in which case the active project or the
//! configured default stack fills it in.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A possibly-partial stack reference as typed by a user.
///
/// `"infra:dev"` names both halves, `":dev"` or `"dev"` names only the stack,
/// and `"infra:"` names only the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackRef {
    pub project: Option<String>,
    pub stack: Option<String>,
}

impl StackRef {
    /// Fill in missing halves from fallbacks and produce a full name.
    pub fn resolve(
        &self,
        default_project: Option<&str>,
        default_stack: Option<&str>,
    ) -> Result<FullStackName> {
        let project = self
            .project
            .as_deref()
            .or(default_project)
            .ok_or_else(|| Error::configuration("a project name is required and none is active"))?;
        let stack = self.stack.as_deref().or(default_stack).ok_or_else(|| {
            Error::configuration("a stack name is required and no default has been set")
        })?;
        Ok(FullStackName::new(project, stack))
    }
}

impl FromStr for StackRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(StackRef::default());
        }
        if let Some((project, stack)) = s.split_once(':') {
            if stack.contains(':') {
                return Err(Error::stack(s, "malformed stack name"));
            }
            Ok(StackRef {
                project: (!project.is_empty()).then(|| project.to_string()),
                stack: (!stack.is_empty()).then(|| stack.to_string()),
            })
        } else {
            Ok(StackRef {
                project: None,
                stack: Some(s.to_string()),
            })
        }
    }
}

/// A fully qualified `<project>:<stack>` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FullStackName {
    project: String,
    stack: String,
}

impl FullStackName {
    #[must_use]
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
        }
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl fmt::Display for FullStackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.stack)
    }
}

impl FromStr for FullStackName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let stack_ref: StackRef = s.parse()?;
        match (stack_ref.project, stack_ref.stack) {
            (Some(project), Some(stack)) => Ok(FullStackName { project, stack }),
            _ => Err(Error::stack(
                s,
                "a fully qualified <project>:<stack> name is required",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_qualified_names() {
        let r: StackRef = "infra:dev".parse().unwrap();
        assert_eq!(r.project.as_deref(), Some("infra"));
        assert_eq!(r.stack.as_deref(), Some("dev"));
    }

    #[test]
    fn parses_partial_names() {
        let r: StackRef = "dev".parse().unwrap();
        assert_eq!(r.project, None);
        assert_eq!(r.stack.as_deref(), Some("dev"));

        let r: StackRef = ":dev".parse().unwrap();
        assert_eq!(r.project, None);
        assert_eq!(r.stack.as_deref(), Some("dev"));

        let r: StackRef = "infra:".parse().unwrap();
        assert_eq!(r.project.as_deref(), Some("infra"));
        assert_eq!(r.stack, None);
    }

    #[test]
    fn rejects_extra_separators() {
        assert!("a:b:c".parse::<StackRef>().is_err());
    }

    #[test]
    fn resolve_applies_defaults() {
        let r: StackRef = "dev".parse().unwrap();
        let full = r.resolve(Some("infra"), Some("prod")).unwrap();
        assert_eq!(full.to_string(), "infra:dev");

        let r = StackRef::default();
        let full = r.resolve(Some("infra"), Some("prod")).unwrap();
        assert_eq!(full.to_string(), "infra:prod");

        let r = StackRef::default();
        assert!(r.resolve(None, Some("prod")).is_err());
        assert!(r.resolve(Some("infra"), None).is_err());
    }

    #[test]
    fn full_name_round_trips() {
        let full: FullStackName = "infra:dev".parse().unwrap();
        assert_eq!(full.project(), "infra");
        assert_eq!(full.stack(), "dev");
        assert_eq!(full.to_string(), "infra:dev");
        assert!("dev".parse::<FullStackName>().is_err());
    }
}
