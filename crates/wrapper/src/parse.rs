//! Argument parsing against harvested help metadata.
//!
//! The wrapper cannot use a fixed grammar because the argument surface
//! belongs to whatever Pulumi version is installed. Instead every token is
//! classified with the [`PulumiMetadata`] topic tree: subcommand words
//! descend the tree, known options consume a value when their help entry
//! says they take one, and everything else is positional.

use std::sync::Arc;

use xpulumi_core::{Error, Result};

use crate::help::{PulumiMetadata, TopicInfo};

/// One option occurrence, canonicalized to its long spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionArg {
    pub flag: String,
    pub value: Option<String>,
}

/// A `pulumi` command line understood in terms of the harvested metadata.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    metadata: Arc<PulumiMetadata>,
    topic_path: Vec<String>,
    options: Vec<OptionArg>,
    positionals: Vec<String>,
    saw_separator: bool,
}

impl ParsedCommand {
    pub fn parse(metadata: Arc<PulumiMetadata>, argv: &[String]) -> Result<Self> {
        let mut topic_path: Vec<String> = Vec::new();
        let mut options: Vec<OptionArg> = Vec::new();
        let mut positionals: Vec<String> = Vec::new();
        let mut saw_separator = false;

        let mut tokens = argv.iter();
        while let Some(token) = tokens.next() {
            if saw_separator {
                positionals.push(token.clone());
                continue;
            }
            if token == "--" {
                saw_separator = true;
                continue;
            }
            if token.starts_with('-') && token != "-" {
                let (flag_text, inline) = match token.split_once('=') {
                    Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
                    _ => (token.as_str(), None),
                };
                let option = metadata.find_option(&topic_path, flag_text).ok_or_else(|| {
                    Error::configuration(format!(
                        "unrecognized option '{flag_text}' for '{}'",
                        command_display(&topic_path)
                    ))
                })?;
                let flag = option.canonical_flag().to_string();
                if option.takes_value() {
                    let value = match inline {
                        Some(value) => value.to_string(),
                        None => tokens.next().cloned().ok_or_else(|| {
                            Error::configuration(format!("option '{flag_text}' requires a value"))
                        })?,
                    };
                    options.push(OptionArg {
                        flag,
                        value: Some(value),
                    });
                } else {
                    if inline.is_some() {
                        return Err(Error::configuration(format!(
                            "option '{flag_text}' does not take a value"
                        )));
                    }
                    options.push(OptionArg { flag, value: None });
                }
                continue;
            }
            // Subcommand words only count before the first positional.
            if positionals.is_empty() {
                let subtopic = metadata
                    .topic_by_path(&topic_path)
                    .and_then(|t| t.subtopic(token));
                if let Some((name, _)) = subtopic {
                    topic_path.push(name.to_string());
                    continue;
                }
            }
            positionals.push(token.clone());
        }

        Ok(Self {
            metadata,
            topic_path,
            options,
            positionals,
            saw_separator,
        })
    }

    /// The topic the command line addresses.
    #[must_use]
    pub fn topic(&self) -> &TopicInfo {
        let mut topic = &self.metadata.root;
        for name in &self.topic_path {
            match topic.subtopics.get(name) {
                Some(child) => topic = child,
                None => break,
            }
        }
        topic
    }

    #[must_use]
    pub fn topic_path(&self) -> &[String] {
        &self.topic_path
    }

    /// Space-joined subcommand words, empty for the root command.
    #[must_use]
    pub fn full_subcmd(&self) -> String {
        self.topic_path.join(" ")
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<PulumiMetadata> {
        &self.metadata
    }

    /// Whether the addressed topic accepts this option at all.
    #[must_use]
    pub fn allows_option(&self, flag: &str) -> bool {
        self.metadata.find_option(&self.topic_path, flag).is_some()
    }

    fn canonical(&self, flag: &str) -> Option<(String, bool)> {
        self.metadata
            .find_option(&self.topic_path, flag)
            .map(|o| (o.canonical_flag().to_string(), o.takes_value()))
    }

    /// Value of a recorded value-taking option; the last occurrence wins.
    #[must_use]
    pub fn option_str(&self, flag: &str) -> Option<&str> {
        let (canonical, _) = self.canonical(flag)?;
        self.options
            .iter()
            .rev()
            .find(|o| o.flag == canonical)
            .and_then(|o| o.value.as_deref())
    }

    /// Whether an option was given.
    #[must_use]
    pub fn option_bool(&self, flag: &str) -> bool {
        match self.canonical(flag) {
            Some((canonical, _)) => self.options.iter().any(|o| o.flag == canonical),
            None => false,
        }
    }

    /// Record or replace a value-taking option.
    pub fn set_option_str(&mut self, flag: &str, value: impl Into<String>) -> Result<()> {
        let (canonical, takes_value) = self.canonical(flag).ok_or_else(|| {
            Error::configuration(format!(
                "option '{flag}' is not defined for '{}'",
                command_display(&self.topic_path)
            ))
        })?;
        if !takes_value {
            return Err(Error::configuration(format!(
                "option '{flag}' does not take a value"
            )));
        }
        let value = value.into();
        if let Some(existing) = self.options.iter_mut().find(|o| o.flag == canonical) {
            existing.value = Some(value);
        } else {
            self.options.push(OptionArg {
                flag: canonical,
                value: Some(value),
            });
        }
        Ok(())
    }

    /// Record a boolean option.
    pub fn set_flag(&mut self, flag: &str) -> Result<()> {
        let (canonical, takes_value) = self.canonical(flag).ok_or_else(|| {
            Error::configuration(format!(
                "option '{flag}' is not defined for '{}'",
                command_display(&self.topic_path)
            ))
        })?;
        if takes_value {
            return Err(Error::configuration(format!(
                "option '{flag}' requires a value"
            )));
        }
        if !self.options.iter().any(|o| o.flag == canonical) {
            self.options.push(OptionArg {
                flag: canonical,
                value: None,
            });
        }
        Ok(())
    }

    /// Remove every occurrence of a flag; reports whether any was present.
    pub fn pop_option_bool(&mut self, flag: &str) -> bool {
        let Some((canonical, _)) = self.canonical(flag) else {
            return false;
        };
        let before = self.options.len();
        self.options.retain(|o| o.flag != canonical);
        before != self.options.len()
    }

    /// Remove every occurrence of an option, returning the last value.
    pub fn pop_option_str(&mut self, flag: &str) -> Option<String> {
        let (canonical, _) = self.canonical(flag)?;
        let mut last = None;
        self.options.retain(|o| {
            if o.flag == canonical {
                last = o.value.clone();
                false
            } else {
                true
            }
        });
        last
    }

    #[must_use]
    pub fn positionals(&self) -> &[String] {
        &self.positionals
    }

    /// Rebuild the final argument vector for the real CLI.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv: Vec<String> = self.topic_path.clone();
        for option in &self.options {
            argv.push(option.flag.clone());
            if let Some(value) = &option.value {
                argv.push(value.clone());
            }
        }
        let needs_separator =
            self.saw_separator || self.positionals.iter().any(|p| p.starts_with('-'));
        if needs_separator && !self.positionals.is_empty() {
            argv.push("--".to_string());
        }
        argv.extend(self.positionals.iter().cloned());
        argv
    }
}

fn command_display(topic_path: &[String]) -> String {
    if topic_path.is_empty() {
        "pulumi".to_string()
    } else {
        format!("pulumi {}", topic_path.join(" "))
    }
}
