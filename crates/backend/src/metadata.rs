//! Stack listing metadata, mirroring what `pulumi stack ls` reports.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::api::StackSummary;

/// Go's zero time, which Pulumi state files use for "never".
const GO_ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// One row of `stack ls` output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackMetadata {
    pub name: String,
    /// Whether this is the stack the wrapper currently targets by default.
    pub current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_count: Option<u64>,
    pub update_in_progress: bool,
}

impl StackMetadata {
    /// Build from a blob backend's checkpoint manifest.
    #[must_use]
    pub fn from_checkpoint(
        name: impl Into<String>,
        current: bool,
        manifest_time: Option<&str>,
        resource_count: Option<u64>,
    ) -> Self {
        let last_update = manifest_time
            .filter(|t| *t != GO_ZERO_TIME)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        Self {
            name: name.into(),
            current,
            last_update,
            resource_count,
            update_in_progress: false,
        }
    }

    /// Build from a service API stack summary.
    #[must_use]
    pub fn from_service_summary(summary: &StackSummary, current: bool) -> Self {
        let last_update = summary
            .last_update
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        Self {
            name: summary.stack_name.clone(),
            current,
            last_update,
            resource_count: summary.resource_count,
            update_in_progress: false,
        }
    }
}

/// Coarse "3 days ago" phrasing for stack listings.
#[must_use]
pub fn humanize_since(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 1 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let months = days / 30;
    let years = days / 365;
    match (seconds, minutes, hours, days, months, years) {
        (1, ..) => "a second ago".to_string(),
        (s, 0, ..) => format!("{s} seconds ago"),
        (_, 1, ..) => "a minute ago".to_string(),
        (_, m, 0, ..) => format!("{m} minutes ago"),
        (_, _, 1, ..) => "an hour ago".to_string(),
        (_, _, h, 0, ..) => format!("{h} hours ago"),
        (_, _, _, 1, ..) => "a day ago".to_string(),
        (_, _, _, d, 0, _) => format!("{d} days ago"),
        (_, _, _, _, 1, _) => "a month ago".to_string(),
        (_, _, _, _, m, 0) => format!("{m} months ago"),
        (_, _, _, _, _, 1) => "a year ago".to_string(),
        (_, _, _, _, _, y) => format!("{y} years ago"),
    }
}

/// Render the aligned `NAME / LAST UPDATE / RESOURCE COUNT` table, with the
/// current stack marked by a `*` suffix.
#[must_use]
pub fn render_stack_table(stacks: &[StackMetadata], now: DateTime<Utc>) -> String {
    let mut rows: Vec<[String; 3]> = vec![[
        "NAME".to_string(),
        "LAST UPDATE".to_string(),
        "RESOURCE COUNT".to_string(),
    ]];
    for stack in stacks {
        let name = if stack.current {
            format!("{}*", stack.name)
        } else {
            stack.name.clone()
        };
        let last_update = match (stack.update_in_progress, stack.last_update) {
            (true, _) => "in progress".to_string(),
            (false, Some(t)) => humanize_since(now, t),
            (false, None) => "n/a".to_string(),
        };
        let resources = stack
            .resource_count
            .map_or_else(|| "n/a".to_string(), |n| n.to_string());
        rows.push([name, last_update, resources]);
    }

    let mut widths = [0usize; 3];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &rows {
        let line = format!(
            "{:<w0$}  {:<w1$}  {}",
            row[0],
            row[1],
            row[2],
            w0 = widths[0],
            w1 = widths[1],
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
