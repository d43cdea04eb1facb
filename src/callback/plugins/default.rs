//! Default output style.
//!
//! Ansible-like output written between an event's begin and end frames:
//!
//! ```text
//! PLAY [webservers] *************************************************************
//!
//! TASK [install nginx] **********************************************************
//! changed: [web1]
//! fatal: [web2]: FAILED! => package not found
//!
//! PLAY RECAP ********************************************************************
//! web1                           : ok=1    changed=1    unreachable=0    failed=0    ...
//! ```

use std::io::{self, Write};

use colored::{Color, Colorize};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::callback::censor::{is_truthy, NO_LOG_MARKER};
use crate::callback::types::{
    HostInfo, IncludedFile, PlayInfo, PlaybookStats, RunnerResult, TaskInfo,
};
use crate::traits::DisplayCallback;

/// Width of header lines.
const OUTPUT_WIDTH: usize = 80;

/// Ansible-like banners, per-host status lines and a final recap.
#[derive(Debug, Clone)]
pub struct DefaultDisplay {
    use_colors: bool,
    show_skipped: bool,
}

impl Default for DefaultDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultDisplay {
    /// Colored output with skipped hosts shown.
    pub fn new() -> Self {
        Self {
            use_colors: true,
            show_skipped: true,
        }
    }

    /// Enable or disable colored output.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Show or hide `skipping:` lines.
    pub fn with_skipped(mut self, show_skipped: bool) -> Self {
        self.show_skipped = show_skipped;
        self
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn host(&self, host: &str) -> String {
        if self.use_colors {
            host.bright_white().bold().to_string()
        } else {
            host.to_string()
        }
    }

    /// Header line with asterisks: `PREFIX [name] ******...`
    fn header(&self, out: &mut dyn Write, prefix: &str, name: &str) -> io::Result<()> {
        let header = if name.is_empty() {
            prefix.to_string()
        } else {
            format!("{} [{}]", prefix, name)
        };
        let stars = "*".repeat(OUTPUT_WIDTH.saturating_sub(header.len() + 1));
        if self.use_colors {
            writeln!(out, "\n{} {}", header.bright_white().bold(), stars.bright_black())
        } else {
            writeln!(out, "\n{} {}", header, stars)
        }
    }

    fn stat(&self, label: &str, value: u64, color: Color) -> String {
        let text = format!("{}={:<4}", label, value);
        if !self.use_colors {
            text
        } else if value > 0 {
            text.color(color).to_string()
        } else {
            text.dimmed().to_string()
        }
    }
}

/// Human-readable message of a result.
pub(crate) fn result_message(result: &RunnerResult) -> String {
    match result.get("msg") {
        Some(JsonValue::String(msg)) => msg.clone(),
        Some(other) => other.to_string(),
        None => result.result.to_string(),
    }
}

fn item_label(result: &RunnerResult) -> Option<String> {
    if result.get(NO_LOG_MARKER).map_or(false, is_truthy) {
        return Some("None".to_string());
    }
    result.get("item").map(|item| match item {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    })
}

impl DisplayCallback for DefaultDisplay {
    fn name(&self) -> &str {
        "default"
    }

    fn play_start(&self, out: &mut dyn Write, play: &PlayInfo) -> io::Result<()> {
        self.header(out, "PLAY", &play.display_name())
    }

    fn task_start(&self, out: &mut dyn Write, task: &TaskInfo, banner: &str) -> io::Result<()> {
        self.header(out, banner, &task.display_name())
    }

    fn runner_ok(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let changed = result.get("changed").map_or(false, is_truthy);
        let status = if changed {
            self.paint("changed", Color::Yellow)
        } else {
            self.paint("ok", Color::Green)
        };
        writeln!(out, "{}: [{}]", status, self.host(&result.host.name))
    }

    fn runner_failed(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        ignore_errors: bool,
    ) -> io::Result<()> {
        writeln!(
            out,
            "{}: [{}]: FAILED! => {}",
            self.paint("fatal", Color::Red),
            self.host(&result.host.name),
            self.paint(&result_message(result), Color::Red)
        )?;
        if ignore_errors {
            writeln!(out, "{}", self.paint("...ignoring", Color::Cyan))?;
        }
        Ok(())
    }

    fn runner_skipped(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        if !self.show_skipped {
            return Ok(());
        }
        writeln!(
            out,
            "{}: [{}]",
            self.paint("skipping", Color::Cyan),
            self.host(&result.host.name)
        )
    }

    fn runner_unreachable(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        writeln!(
            out,
            "{}: [{}]: UNREACHABLE! => {}",
            self.paint("fatal", Color::Red),
            self.host(&result.host.name),
            self.paint(&result_message(result), Color::Red)
        )
    }

    fn runner_item(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        status: &str,
    ) -> io::Result<()> {
        if status == "skipping" && !self.show_skipped {
            return Ok(());
        }
        let color = match status {
            "failed" => Color::Red,
            "skipping" => Color::Cyan,
            _ if result.get("changed").map_or(false, is_truthy) => Color::Yellow,
            _ => Color::Green,
        };
        let item = item_label(result).unwrap_or_default();
        writeln!(
            out,
            "{}: [{}] => (item={})",
            self.paint(status, color),
            self.host(&result.host.name),
            item
        )
    }

    fn runner_retry(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let retries = result.get("retries").and_then(JsonValue::as_u64).unwrap_or(0);
        let attempts = result.get("attempts").and_then(JsonValue::as_u64).unwrap_or(0);
        writeln!(
            out,
            "{} [{}]: {} ({} retries left).",
            self.paint("FAILED - RETRYING:", Color::Yellow),
            self.host(&result.host.name),
            result.task.display_name(),
            retries.saturating_sub(attempts)
        )
    }

    fn file_diff(&self, out: &mut dyn Write, host: &HostInfo, diff: &JsonValue) -> io::Result<()> {
        let before = diff.get("before").and_then(JsonValue::as_str).unwrap_or("");
        let after = diff.get("after").and_then(JsonValue::as_str).unwrap_or("");
        writeln!(out, "--- before ({})", host.name)?;
        writeln!(out, "+++ after ({})", host.name)?;
        for line in before.lines() {
            writeln!(out, "{}", self.paint(&format!("-{}", line), Color::Red))?;
        }
        for line in after.lines() {
            writeln!(out, "{}", self.paint(&format!("+{}", line), Color::Green))?;
        }
        Ok(())
    }

    fn include(&self, out: &mut dyn Write, included: &IncludedFile) -> io::Result<()> {
        writeln!(out, "{}: {}", self.paint("included", Color::Cyan), included.filename)
    }

    fn no_hosts_matched(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{}",
            self.paint("skipping: no hosts matched", Color::Cyan)
        )
    }

    fn no_hosts_remaining(&self, out: &mut dyn Write) -> io::Result<()> {
        self.header(out, "NO MORE HOSTS LEFT", "")
    }

    fn stats(&self, out: &mut dyn Write, stats: &PlaybookStats) -> io::Result<()> {
        self.header(out, "PLAY RECAP", "")?;

        let mut hosts = stats.hosts();
        hosts.sort();
        for host in hosts {
            let count = |map: &IndexMap<String, u64>| PlaybookStats::count(map, &host);
            let failed = count(&stats.failures) + count(&stats.dark);
            let host_label = if !self.use_colors {
                host.clone()
            } else if failed > 0 {
                host.red().bold().to_string()
            } else if count(&stats.changed) > 0 {
                host.yellow().to_string()
            } else {
                host.green().to_string()
            };
            writeln!(
                out,
                "{:<30} : {} {} {} {} {} {} {}",
                host_label,
                self.stat("ok", count(&stats.ok), Color::Green),
                self.stat("changed", count(&stats.changed), Color::Yellow),
                self.stat("unreachable", count(&stats.dark), Color::Red),
                self.stat("failed", count(&stats.failures), Color::Red),
                self.stat("skipped", count(&stats.skipped), Color::Cyan),
                self.stat("rescued", count(&stats.rescued), Color::Magenta),
                self.stat("ignored", count(&stats.ignored), Color::Blue),
            )?;
        }
        Ok(())
    }
}
