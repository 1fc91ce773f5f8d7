//! Harvested Pulumi help metadata.
//!
//! The wrapper needs to know, for every `pulumi` subcommand, which options
//! exist and which of them take a value. Pulumi does not publish that in a
//! machine-readable form, so we run `pulumi <topic> --help` recursively and
//! parse the Cobra help text into a topic tree. The result is cached under
//! the Pulumi home and reused until the CLI version changes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xpulumi_core::constants::PULUMI_HELP_METADATA_FILENAME;
use xpulumi_core::fsutil::write_atomic_string;
use xpulumi_core::{EnvironmentVariables, Error, Result};

// Cobra flag line: two spaces, then either "-s, " or four spaces, the long
// flag, an optional value name (possibly with a "[=default]" tail or a
// trailing colon), at least two spaces, then the description.
static OPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)\A  (?:(?P<short>-[a-zA-Z0-9]), |    )(?P<long>--[a-zA-Z0-9_.\-]+)(?: (?P<value>[a-zA-Z0-9_]+)(?:\[=[^\]]+\])?:?)?  \s*(?P<description>[^ ].*)\z",
    )
    .unwrap()
});

// "Available Commands:" entry: "  <name>  <description>".
static SUBCOMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^  (?P<name>[a-zA-Z0-9\-]+)\s+(?P<description>[^ ].*)$").unwrap());

/// One command-line option as described by a help screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionInfo {
    /// All spellings of the flag, e.g. `["--stack", "-s"]`.
    pub flags: Vec<String>,
    /// Name of the value placeholder; present exactly when the option
    /// takes a value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<String>,
    pub description: String,
}

impl OptionInfo {
    fn from_help_line(topic: &str, line: &str) -> Result<Self> {
        let caps = OPTION_RE
            .captures(line)
            .ok_or_else(|| Error::help_parse(topic, format!("invalid flag line: {line:?}")))?;
        let mut flags = vec![caps["long"].to_string()];
        if let Some(short) = caps.name("short") {
            flags.push(short.as_str().to_string());
        }
        Ok(Self {
            flags,
            value_name: caps.name("value").map(|v| v.as_str().to_string()),
            description: caps["description"].to_string(),
        })
    }

    #[must_use]
    pub fn takes_value(&self) -> bool {
        self.value_name.is_some()
    }

    #[must_use]
    pub fn matches(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// The long spelling, used as the canonical form everywhere else.
    #[must_use]
    pub fn canonical_flag(&self) -> &str {
        self.flags
            .iter()
            .find(|f| f.starts_with("--"))
            .unwrap_or(&self.flags[0])
    }
}

/// Help for one `pulumi` subcommand (the root command included), with its
/// children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Subcommand words from the CLI root, empty for the root itself.
    #[serde(skip)]
    pub path: Vec<String>,
    pub title: String,
    pub description: String,
    pub usage: String,
    pub epilog: String,
    /// How the parent's "Available Commands" list described this topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_options: Vec<OptionInfo>,
    #[serde(
        default,
        rename = "subcommands",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub subtopics: BTreeMap<String, TopicInfo>,
}

impl TopicInfo {
    #[must_use]
    pub fn full_name(&self) -> String {
        self.path.join(" ")
    }

    #[must_use]
    pub fn short_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Child topic by primary name or alias, with its primary name.
    pub fn subtopic(&self, name: &str) -> Option<(&str, &TopicInfo)> {
        self.subtopics
            .iter()
            .find(|(n, t)| n.as_str() == name || t.aliases.iter().any(|a| a == name))
            .map(|(n, t)| (n.as_str(), t))
    }

    /// Option listed directly on this topic's help screen.
    pub fn own_option(&self, flag: &str) -> Option<&OptionInfo> {
        self.options
            .iter()
            .chain(self.global_options.iter())
            .find(|o| o.matches(flag))
    }

    /// Register a boolean option the real CLI does not know about.
    /// Persistent options are inherited by every descendant topic.
    pub fn add_option(&mut self, flags: &[&str], description: &str, persistent: bool) {
        let info = OptionInfo {
            flags: flags.iter().map(|f| (*f).to_string()).collect(),
            value_name: None,
            description: description.to_string(),
        };
        if persistent {
            self.global_options.push(info);
        } else {
            self.options.push(info);
        }
    }

    fn assign_paths(&mut self, path: Vec<String>) {
        self.path = path;
        let names: Vec<String> = self.subtopics.keys().cloned().collect();
        for name in names {
            let mut child_path = self.path.clone();
            child_path.push(name.clone());
            if let Some(child) = self.subtopics.get_mut(&name) {
                child.assign_paths(child_path);
            }
        }
    }

    /// Rebuild a help screen from the harvested data.
    #[must_use]
    pub fn render_help(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push_str("\n\n");
        if !self.description.is_empty() {
            out.push_str(&self.description);
            out.push_str("\n\n");
        }
        out.push_str("Usage:\n");
        out.push_str(&self.usage);
        out.push_str("\n\n");
        if !self.aliases.is_empty() {
            let mut names = vec![self.short_name().to_string()];
            names.extend(self.aliases.iter().cloned());
            out.push_str("Aliases:\n  ");
            out.push_str(&names.join(", "));
            out.push_str("\n\n");
        }
        if !self.subtopics.is_empty() {
            out.push_str("Available Commands:\n");
            let width = self.subtopics.keys().map(String::len).max().unwrap_or(0);
            for (name, topic) in &self.subtopics {
                let description = topic.parent_description.as_deref().unwrap_or(&topic.title);
                out.push_str(&format!("  {name:width$}  {description}\n"));
            }
            out.push('\n');
        }
        if !self.options.is_empty() {
            out.push_str("Flags:\n");
            out.push_str(&render_option_block(&self.options));
            out.push('\n');
        }
        if !self.global_options.is_empty() {
            out.push_str("Global Flags:\n");
            out.push_str(&render_option_block(&self.global_options));
            out.push('\n');
        }
        if !self.epilog.is_empty() {
            out.push_str(&self.epilog);
            out.push('\n');
        }
        out
    }
}

fn render_option_block(options: &[OptionInfo]) -> String {
    let leads: Vec<String> = options
        .iter()
        .map(|option| {
            let short = option.flags.iter().find(|f| !f.starts_with("--"));
            let mut lead = match short {
                Some(short) => format!("  {short}, {}", option.canonical_flag()),
                None => format!("      {}", option.canonical_flag()),
            };
            if let Some(value) = &option.value_name {
                lead.push(' ');
                lead.push_str(value);
            }
            lead
        })
        .collect();
    let width = leads.iter().map(String::len).max().unwrap_or(0);
    let mut out = String::new();
    for (lead, option) in leads.iter().zip(options) {
        let mut description = option.description.split('\n');
        let first = description.next().unwrap_or("");
        out.push_str(&format!("{lead:width$}  {first}\n"));
        for rest in description {
            out.push_str(&format!("{:width$}  {rest}\n", ""));
        }
    }
    out
}

/// The full harvested help tree for one installed Pulumi version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulumiMetadata {
    /// Raw `pulumi version` output the tree was harvested from.
    pub version: String,
    #[serde(rename = "help_data")]
    pub root: TopicInfo,
}

impl PulumiMetadata {
    /// Load the cached metadata when it matches the installed CLI version,
    /// otherwise harvest from `pulumi --help` and rewrite the cache.
    ///
    /// Runs the CLI synchronously; call from a blocking context.
    pub fn load(pulumi_home: &Path, env: &EnvironmentVariables, clean: bool) -> Result<Self> {
        let runner = HelpRunner::new(pulumi_home, env)?;
        let version = runner.version()?;
        let cache_path = pulumi_home.join(PULUMI_HELP_METADATA_FILENAME);
        if !clean && cache_path.is_file() {
            match Self::load_cache(&cache_path) {
                Ok(cached) if cached.version == version => {
                    debug!(cache = %cache_path.display(), "reusing pulumi help metadata");
                    return Ok(cached);
                }
                Ok(_) => {
                    debug!(cache = %cache_path.display(), "help metadata is for another pulumi version");
                }
                Err(e) => {
                    warn!(cache = %cache_path.display(), error = %e, "unreadable help metadata cache; reharvesting");
                }
            }
        }
        debug!(version = %version, "harvesting pulumi help metadata");
        let root = runner.harvest(Vec::new(), None)?;
        let metadata = Self { version, root };
        write_atomic_string(&cache_path, &serde_json::to_string(&metadata)?)?;
        Ok(metadata)
    }

    fn load_cache(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| Error::file_system(path, "read", e))?;
        let mut metadata: Self = serde_json::from_str(&text)?;
        metadata.root.assign_paths(Vec::new());
        Ok(metadata)
    }

    pub fn topic_by_path(&self, path: &[String]) -> Option<&TopicInfo> {
        let mut topic = &self.root;
        for name in path {
            topic = topic.subtopics.get(name)?;
        }
        Some(topic)
    }

    pub fn topic_by_path_mut(&mut self, path: &[String]) -> Option<&mut TopicInfo> {
        let mut topic = &mut self.root;
        for name in path {
            topic = topic.subtopics.get_mut(name)?;
        }
        Some(topic)
    }

    /// Topic addressed by its space-separated full name, e.g. `"stack rm"`.
    pub fn topic_by_full_name_mut(&mut self, full_name: &str) -> Option<&mut TopicInfo> {
        let path: Vec<String> = full_name.split_whitespace().map(str::to_string).collect();
        self.topic_by_path_mut(&path)
    }

    /// Option visible at a topic: the topic's own flags first, then
    /// persistent flags inherited from each ancestor. The root's plain
    /// flags count as persistent since Cobra lists the global set there.
    pub fn find_option(&self, topic_path: &[String], flag: &str) -> Option<&OptionInfo> {
        let mut chain = vec![&self.root];
        let mut topic = &self.root;
        for name in topic_path {
            topic = topic.subtopics.get(name)?;
            chain.push(topic);
        }
        if let Some(option) = topic.own_option(flag) {
            return Some(option);
        }
        for ancestor in chain.iter().rev().skip(1) {
            if let Some(option) = ancestor.global_options.iter().find(|o| o.matches(flag)) {
                return Some(option);
            }
            if ancestor.path.is_empty() {
                if let Some(option) = ancestor.options.iter().find(|o| o.matches(flag)) {
                    return Some(option);
                }
            }
        }
        None
    }
}

/// Runs the real CLI to collect version and help screens.
struct HelpRunner {
    program: PathBuf,
    env: HashMap<String, String>,
}

impl HelpRunner {
    fn new(pulumi_home: &Path, env: &EnvironmentVariables) -> Result<Self> {
        let bin_dir = pulumi_home.join("bin");
        let program = bin_dir.join("pulumi");
        if !program.is_file() {
            return Err(Error::install(format!(
                "pulumi CLI not found at '{}'; run 'xpulumi install-pulumi' first",
                program.display()
            )));
        }
        let mut env = env.clone();
        env.prepend_path("PATH", &bin_dir.display().to_string());
        Ok(Self {
            program,
            env: env.as_map().clone(),
        })
    }

    fn version(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("version")
            .envs(&self.env)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(&["version".to_string()], e))?;
        if !output.status.success() {
            return Err(Error::command_execution(
                self.program.display().to_string(),
                vec!["version".to_string()],
                "pulumi version failed",
                output.status.code(),
            ));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(Error::install("pulumi reported an empty version"));
        }
        Ok(version)
    }

    fn help_text(&self, path: &[String]) -> Result<String> {
        let mut args: Vec<String> = path.to_vec();
        args.push("--help".to_string());
        let output = Command::new(&self.program)
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(&args, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(Error::command_execution(
                self.program.display().to_string(),
                args,
                if message.is_empty() {
                    "pulumi --help failed"
                } else {
                    message
                },
                output.status.code(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn harvest(&self, path: Vec<String>, parent_description: Option<String>) -> Result<TopicInfo> {
        let text = self.help_text(&path)?;
        let raw = parse_help_text(&path, parent_description.as_deref(), &text)?;
        let mut subtopics = BTreeMap::new();
        for (name, description) in raw.subcommands {
            let mut child_path = path.clone();
            child_path.push(name.clone());
            let child = self.harvest(child_path, Some(description))?;
            subtopics.insert(name, child);
        }
        Ok(TopicInfo {
            path,
            title: raw.title,
            description: raw.description,
            usage: raw.usage,
            epilog: raw.epilog,
            parent_description,
            aliases: raw.aliases,
            options: raw.options,
            global_options: raw.global_options,
            subtopics,
        })
    }

    fn spawn_error(&self, args: &[String], e: std::io::Error) -> Error {
        Error::command_execution(
            self.program.display().to_string(),
            args.to_vec(),
            format!("failed to spawn: {e}"),
            None,
        )
    }
}

struct RawTopic {
    title: String,
    description: String,
    usage: String,
    aliases: Vec<String>,
    options: Vec<OptionInfo>,
    global_options: Vec<OptionInfo>,
    epilog: String,
    subcommands: Vec<(String, String)>,
}

/// Walk a Cobra help screen section by section.
fn parse_help_text(
    path: &[String],
    parent_description: Option<&str>,
    help_text: &str,
) -> Result<RawTopic> {
    let full_name = path.join(" ");
    let lines: Vec<String> = help_text
        .trim_end()
        .split('\n')
        .map(|l| l.trim_end().to_string())
        .collect();
    let fail = |i: usize, msg: &str| -> Error {
        match lines.get(i) {
            Some(line) => Error::help_parse(&full_name, format!("line {i} ({line:?}): {msg}")),
            None => Error::help_parse(&full_name, format!("line {i}: {msg}")),
        }
    };
    if lines.len() < 3 {
        return Err(Error::help_parse(&full_name, "help output too short"));
    }

    let (title, description_start) = if lines[1].is_empty() {
        (lines[0].clone(), 2)
    } else {
        // No title block; Cobra prints these straight into the usage.
        let title = match parent_description {
            Some(d) => d.to_string(),
            None => format!("Subcommand '{full_name}'"),
        };
        (title, 0)
    };

    let mut i = description_start;
    while i < lines.len() && lines[i] != "Usage:" {
        i += 1;
    }
    if i >= lines.len() {
        return Err(Error::help_parse(&full_name, "no 'Usage:' section"));
    }
    let description = if i > description_start {
        if !lines[i - 1].is_empty() {
            return Err(fail(i - 1, "expected a blank line before 'Usage:'"));
        }
        lines[description_start..i - 1].join("\n")
    } else {
        String::new()
    };

    i += 1;
    let usage_start = i;
    while i < lines.len() && (lines[i].is_empty() || lines[i].starts_with(' ')) {
        i += 1;
    }
    if i >= lines.len() || usage_start + 1 >= i {
        return Err(fail(i, "unterminated 'Usage:' section"));
    }
    if !lines[i - 1].is_empty() {
        return Err(fail(i - 1, "expected a blank line after the usage block"));
    }
    let usage = lines[usage_start..i - 1].join("\n");

    let short_name = path.last().map(String::as_str).unwrap_or("");
    let mut aliases = Vec::new();
    if lines[i] == "Aliases:" {
        i += 1;
        if i >= lines.len() {
            return Err(fail(i, "unterminated 'Aliases:' section"));
        }
        aliases = lines[i]
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty() && a.as_str() != short_name)
            .collect();
        i += 1;
        if lines.get(i).map(String::as_str) != Some("") {
            return Err(fail(i, "expected a blank line after 'Aliases:'"));
        }
        i += 1;
    }

    let mut subcommands = Vec::new();
    if lines.get(i).map(String::as_str) == Some("Available Commands:") {
        i += 1;
        while i < lines.len() && !lines[i].is_empty() {
            let caps = SUBCOMMAND_RE
                .captures(&lines[i])
                .ok_or_else(|| fail(i, "invalid subcommand line"))?;
            subcommands.push((caps["name"].to_string(), caps["description"].to_string()));
            i += 1;
        }
        i += 1;
    }

    if lines.get(i).map(String::as_str) != Some("Flags:") {
        return Err(fail(i, "expected 'Flags:'"));
    }
    i += 1;
    let options = parse_option_block(&full_name, &lines, &mut i)?;
    i += 1;
    let mut global_options = Vec::new();
    if lines.get(i).map(String::as_str) == Some("Global Flags:") {
        i += 1;
        global_options = parse_option_block(&full_name, &lines, &mut i)?;
        i += 1;
    }
    let epilog = if i < lines.len() {
        lines[i..].join("\n")
    } else {
        String::new()
    };

    Ok(RawTopic {
        title,
        description,
        usage,
        aliases,
        options,
        global_options,
        epilog,
        subcommands,
    })
}

/// Flag lines up to the next blank line. Continuation lines are indented
/// at least eight spaces and fold into the previous option's description.
fn parse_option_block(topic: &str, lines: &[String], i: &mut usize) -> Result<Vec<OptionInfo>> {
    let mut options = Vec::new();
    while *i < lines.len() && !lines[*i].is_empty() {
        let mut joined = lines[*i].clone();
        while *i + 1 < lines.len() && lines[*i + 1].starts_with("        ") {
            *i += 1;
            joined.push('\n');
            joined.push_str(lines[*i].trim_start());
        }
        options.push(OptionInfo::from_help_line(topic, &joined)?);
        *i += 1;
    }
    Ok(options)
}
