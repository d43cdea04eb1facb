//! Output formatting module for Rustible Events
//!
//! Colored sections and tables for the summary command, and error reporting
//! shared by every command.

use colored::Colorize;
use std::io::{self, Write};

/// Host status derived from a runner event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Task completed successfully with no changes
    Ok,
    /// Task completed with changes made
    Changed,
    /// Task was skipped
    Skipped,
    /// Task failed
    Failed,
    /// Task failed with `ignore_errors`
    Ignored,
    /// Host could not be reached
    Unreachable,
}

impl HostStatus {
    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            HostStatus::Ok => "ok".green().to_string(),
            HostStatus::Changed => "changed".yellow().to_string(),
            HostStatus::Skipped => "skipped".cyan().to_string(),
            HostStatus::Failed => "failed".red().bold().to_string(),
            HostStatus::Ignored => "ignored".blue().to_string(),
            HostStatus::Unreachable => "unreachable".red().bold().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Ok => "ok",
            HostStatus::Changed => "changed",
            HostStatus::Skipped => "skipped",
            HostStatus::Failed => "failed",
            HostStatus::Ignored => "ignored",
            HostStatus::Unreachable => "unreachable",
        }
    }
}

/// Output formatter for human and JSON modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
        }
    }

    /// Whether colors are enabled
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Whether output is JSON
    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    /// Verbosity level
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Print a section header
    pub fn section(&self, out: &mut dyn Write, title: &str) -> io::Result<()> {
        if self.json_mode {
            return Ok(());
        }

        if self.use_color {
            writeln!(out, "\n{}", title.cyan().bold())?;
            writeln!(out, "{}", "-".repeat(title.len()).cyan())
        } else {
            writeln!(out, "\n{}", title)?;
            writeln!(out, "{}", "-".repeat(title.len()))
        }
    }

    /// Print a table with left-aligned columns
    pub fn table(&self, out: &mut dyn Write, headers: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = join_cells(headers.iter().copied(), &widths);
        if self.use_color {
            writeln!(out, "{}", header_line.bright_white().bold())?;
        } else {
            writeln!(out, "{}", header_line)?;
        }

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            writeln!(out, "{}", sep.join("-+-").bright_black())?;
        } else {
            writeln!(out, "{}", sep.join("-+-"))?;
        }

        for row in rows {
            writeln!(out, "{}", join_cells(row.iter().map(String::as_str), &widths))?;
        }
        Ok(())
    }

    /// Print an error message to stderr
    pub fn error(&self, message: &str) {
        if self.json_mode {
            let err = serde_json::json!({
                "type": "error",
                "message": message
            });
            eprintln!("{}", err);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message to stderr
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            let warn = serde_json::json!({
                "type": "warning",
                "message": message
            });
            eprintln!("{}", warn);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }
}

fn join_cells<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{:width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let output = OutputFormatter::new(false, false, 0);
        let mut out = Vec::new();
        output
            .table(
                &mut out,
                &["EVENT", "COUNT"],
                &[
                    vec!["runner_on_ok".to_string(), "3".to_string()],
                    vec!["playbook_on_stats".to_string(), "1".to_string()],
                ],
            )
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "EVENT             | COUNT");
        assert_eq!(lines[1], "------------------+------");
        assert_eq!(lines[2], "runner_on_ok      | 3");
        assert_eq!(lines[3], "playbook_on_stats | 1");
    }

    #[test]
    fn test_json_mode_has_no_sections() {
        let output = OutputFormatter::new(false, true, 0);
        let mut out = Vec::new();
        output.section(&mut out, "EVENTS").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(HostStatus::Unreachable.as_str(), "unreachable");
        assert!(HostStatus::Ok.colored_string().contains("ok"));
    }
}
