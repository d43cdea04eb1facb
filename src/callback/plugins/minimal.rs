//! Minimal output style.
//!
//! Silent on success, one line per failure or unreachable host, and a
//! compact recap. Play and task starts are not reported as events in this
//! style; the task still becomes the active task for the host events that
//! follow.
//!
//! ```text
//! FAILED: web2 | install nginx | package not found
//! UNREACHABLE: db1 | install nginx | ssh: connect to host db1 port 22: timed out
//!
//! RECAP: web1 ok=5 changed=2 failed=0 skipped=0 unreachable=0
//! ```

use std::io::{self, Write};

use colored::Colorize;
use indexmap::IndexMap;

use super::default::result_message;
use crate::callback::types::{PlaybookStats, RunnerResult};
use crate::traits::DisplayCallback;

/// Failures-only output style.
#[derive(Debug, Clone)]
pub struct MinimalDisplay {
    use_colors: bool,
}

impl Default for MinimalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl MinimalDisplay {
    /// Creates a colored minimal display.
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    /// Enable or disable colored output.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn line(&self, label: &str, result: &RunnerResult) -> String {
        let host = &result.host.name;
        let task = result.task.display_name();
        let message = result_message(result);
        if !self.use_colors {
            return format!("{}: {} | {} | {}", label, host, task, message);
        }
        let label = if label == "UNREACHABLE" {
            label.magenta().bold()
        } else {
            label.red().bold()
        };
        format!(
            "{}: {} | {} | {}",
            label,
            host.bright_white().bold(),
            task.yellow(),
            message
        )
    }
}

impl DisplayCallback for MinimalDisplay {
    fn name(&self) -> &str {
        "minimal"
    }

    fn reports_play_and_task_starts(&self) -> bool {
        false
    }

    fn runner_failed(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        ignore_errors: bool,
    ) -> io::Result<()> {
        if ignore_errors {
            return Ok(());
        }
        writeln!(out, "{}", self.line("FAILED", result))
    }

    fn runner_unreachable(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        writeln!(out, "{}", self.line("UNREACHABLE", result))
    }

    fn runner_item(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        status: &str,
    ) -> io::Result<()> {
        if status != "failed" {
            return Ok(());
        }
        writeln!(out, "{}", self.line("FAILED", result))
    }

    fn stats(&self, out: &mut dyn Write, stats: &PlaybookStats) -> io::Result<()> {
        let mut hosts = stats.hosts();
        if hosts.is_empty() {
            return Ok(());
        }
        hosts.sort();
        writeln!(out)?;
        for host in hosts {
            let count = |map: &IndexMap<String, u64>| PlaybookStats::count(map, &host);
            let line = format!(
                "{} ok={} changed={} failed={} skipped={} unreachable={}",
                host,
                count(&stats.ok),
                count(&stats.changed),
                count(&stats.failures),
                count(&stats.skipped),
                count(&stats.dark),
            );
            if self.use_colors {
                writeln!(out, "{}: {}", "RECAP".bright_black(), line)?;
            } else {
                writeln!(out, "RECAP: {}", line)?;
            }
        }
        Ok(())
    }
}
