//! Rendering helpers shared by the subcommands.
//!
//! Tables and JSON go to stdout; progress banners go to stderr so that
//! piping stdout somewhere useful still shows what is happening.

use serde_json::Value;
use xpulumi_core::Result;

const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Print a JSON value, pretty by default and single-line in compact mode.
pub fn print_json(value: &Value, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{text}");
    Ok(())
}

/// Render an aligned table with a header row. Columns are separated by two
/// spaces and trailing whitespace is trimmed per line.
#[must_use]
pub fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut all: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    all.push(header.iter().map(|h| (*h).to_string()).collect());
    all.extend(rows.iter().cloned());

    let mut widths = vec![0usize; header.len()];
    for row in &all {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &all {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(widths.iter()) {
            line.push_str(&format!("{cell:<width$}  "));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn paint(text: &str, ansi: bool) -> String {
    if ansi {
        format!("{GREEN}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Full-width banner on stderr announcing a deployment step.
pub fn banner(message: &str, ansi: bool) {
    let rule = "=".repeat(79);
    eprintln!();
    eprintln!("{}", paint(&rule, ansi));
    eprintln!("{}", paint(&format!("     {message}"), ansi));
    eprintln!("{}", paint(&rule, ansi));
    eprintln!();
}
