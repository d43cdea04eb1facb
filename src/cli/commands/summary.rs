//! Summary command - count events per name and per host

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{for_each_item, open_input, CommandContext};
use crate::callback::censor::is_truthy;
use crate::callback::types::{Attributes, EventName};
use crate::callback::wire::StreamItem;
use crate::cli::output::{HostStatus, OutputFormatter};

/// Arguments for the summary command
#[derive(Parser, Debug, Clone)]
pub struct SummaryArgs {
    /// Captured stream to read (stdin when omitted or `-`)
    pub file: Option<PathBuf>,

    /// Print the summary as a JSON document
    #[arg(long)]
    pub json: bool,
}

/// Per-host outcome counts of runner events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostTally {
    pub ok: u64,
    pub changed: u64,
    pub failed: u64,
    pub ignored: u64,
    pub skipped: u64,
    pub unreachable: u64,
}

impl HostTally {
    /// Record one runner outcome
    pub fn record(&mut self, status: HostStatus) {
        match status {
            HostStatus::Ok => self.ok += 1,
            HostStatus::Changed => self.changed += 1,
            HostStatus::Failed => self.failed += 1,
            HostStatus::Ignored => self.ignored += 1,
            HostStatus::Skipped => self.skipped += 1,
            HostStatus::Unreachable => self.unreachable += 1,
        }
    }

    /// Check if there were any failures
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.unreachable > 0
    }
}

/// Counts collected from one captured stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Playbook file of the first `playbook_on_start`
    pub playbook: Option<String>,
    /// Event name to count, in order of first appearance
    pub events: IndexMap<String, u64>,
    /// Host to runner outcome counts
    pub hosts: IndexMap<String, HostTally>,
    /// Number of end markers seen
    pub completed: u64,
    /// Bytes of plain display text
    pub output_bytes: u64,
}

impl RunSummary {
    /// Fold one stream item into the summary
    pub fn record(&mut self, item: &StreamItem) {
        match item {
            StreamItem::Event(attrs) => self.record_event(attrs),
            StreamItem::EventEnd => self.completed += 1,
            StreamItem::Output(text) => self.output_bytes += text.len() as u64,
        }
    }

    /// Total number of events
    pub fn total(&self) -> u64 {
        self.events.values().sum()
    }

    /// Check if any host failed or was unreachable
    pub fn has_failures(&self) -> bool {
        self.hosts.values().any(HostTally::has_failures)
    }

    fn record_event(&mut self, attrs: &Attributes) {
        let name = attrs
            .get("event")
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown");
        *self.events.entry(name.to_string()).or_default() += 1;

        if self.playbook.is_none() && name == EventName::PlaybookOnStart.as_str() {
            self.playbook = attrs
                .get("playbook")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
        }

        let Some(status) = host_status(name, attrs) else {
            return;
        };
        if let Some(host) = attrs.get("host").and_then(JsonValue::as_str) {
            self.hosts.entry(host.to_string()).or_default().record(status);
        }
    }
}

/// Outcome of a task-level runner event; item and async events are not counted.
fn host_status(name: &str, attrs: &Attributes) -> Option<HostStatus> {
    let flag = |key: &str| attrs.get(key).map_or(false, is_truthy);
    match name.parse::<EventName>().ok()? {
        EventName::RunnerOnOk => {
            let changed = flag("changed")
                || attrs
                    .get("res")
                    .and_then(|res| res.get("changed"))
                    .map_or(false, is_truthy);
            Some(if changed {
                HostStatus::Changed
            } else {
                HostStatus::Ok
            })
        }
        EventName::RunnerOnFailed if flag("ignore_errors") => Some(HostStatus::Ignored),
        EventName::RunnerOnFailed => Some(HostStatus::Failed),
        EventName::RunnerOnSkipped => Some(HostStatus::Skipped),
        EventName::RunnerOnUnreachable => Some(HostStatus::Unreachable),
        _ => None,
    }
}

impl SummaryArgs {
    /// Execute the summary command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let input = open_input(self.file.as_deref())?;
        let summary = Self::collect(input)?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        match self.render(&ctx.output, &summary, &mut out) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(0),
            Err(e) => Err(e.into()),
            Ok(()) if summary.has_failures() => Ok(2),
            Ok(()) => Ok(0),
        }
    }

    /// Read a whole stream into a summary
    pub fn collect<R: Read>(input: R) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for_each_item(input, |item| {
            summary.record(&item);
            Ok(())
        })?;
        Ok(summary)
    }

    /// Write `summary` in the formatter's mode
    pub fn render(
        &self,
        output: &OutputFormatter,
        summary: &RunSummary,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        if output.is_json() {
            serde_json::to_writer_pretty(&mut *out, summary)?;
            return writeln!(out);
        }

        if let Some(playbook) = &summary.playbook {
            writeln!(out, "Playbook: {}", playbook)?;
        }
        writeln!(
            out,
            "{} events, {} completed",
            summary.total(),
            summary.completed
        )?;

        output.section(out, "EVENTS")?;
        let rows: Vec<Vec<String>> = summary
            .events
            .iter()
            .map(|(name, count)| vec![name.clone(), count.to_string()])
            .collect();
        output.table(out, &["EVENT", "COUNT"], &rows)?;

        if summary.hosts.is_empty() {
            return Ok(());
        }
        output.section(out, "HOSTS")?;
        for (host, tally) in &summary.hosts {
            writeln!(out, "{}", host_line(output.use_color(), host, tally))?;
        }
        Ok(())
    }
}

fn host_line(use_color: bool, host: &str, tally: &HostTally) -> String {
    let counts = [
        (HostStatus::Ok, tally.ok),
        (HostStatus::Changed, tally.changed),
        (HostStatus::Unreachable, tally.unreachable),
        (HostStatus::Failed, tally.failed),
        (HostStatus::Skipped, tally.skipped),
        (HostStatus::Ignored, tally.ignored),
    ];

    if !use_color {
        let stats: Vec<String> = counts
            .iter()
            .map(|(status, n)| format!("{}={:<4}", status.as_str(), n))
            .collect();
        return format!("{:<30} : {}", host, stats.join(" ")).trim_end().to_string();
    }

    let host_label = if tally.has_failures() {
        host.red().bold()
    } else if tally.changed > 0 {
        host.yellow()
    } else {
        host.green()
    };
    let stats: Vec<String> = counts
        .iter()
        .map(|(status, n)| {
            if *n > 0 {
                format!("{}={:<4}", status.colored_string(), n)
            } else {
                format!("{}={:<4}", status.as_str(), n).dimmed().to_string()
            }
        })
        .collect();
    format!("{:<30} : {}", host_label, stats.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::wire::{encode_frame, END_FRAME};
    use serde_json::json;

    fn push_event(stream: &mut Vec<u8>, event: JsonValue, output: &str) {
        stream.extend(encode_frame(&serde_json::to_vec(&event).unwrap(), 78));
        stream.extend(output.as_bytes());
        stream.extend(END_FRAME);
    }

    fn run() -> Vec<u8> {
        let mut stream = Vec::new();
        push_event(
            &mut stream,
            json!({"event": "playbook_on_start", "playbook": "site.yml"}),
            "",
        );
        push_event(
            &mut stream,
            json!({"event": "runner_on_ok", "host": "web1", "res": {"changed": true}}),
            "changed: [web1]\n",
        );
        push_event(
            &mut stream,
            json!({"event": "runner_on_ok", "host": "web2", "res": {}}),
            "ok: [web2]\n",
        );
        push_event(
            &mut stream,
            json!({"event": "runner_on_failed", "host": "web2", "ignore_errors": true}),
            "",
        );
        push_event(
            &mut stream,
            json!({"event": "runner_on_unreachable", "host": "db1"}),
            "",
        );
        push_event(
            &mut stream,
            json!({"event": "runner_item_on_ok", "host": "web1"}),
            "",
        );
        stream
    }

    #[test]
    fn test_counts() {
        let summary = SummaryArgs::collect(&run()[..]).unwrap();
        assert_eq!(summary.playbook.as_deref(), Some("site.yml"));
        assert_eq!(summary.total(), 6);
        assert_eq!(summary.completed, 6);
        assert_eq!(summary.events["runner_on_ok"], 2);
        assert_eq!(summary.hosts["web1"].changed, 1);
        assert_eq!(summary.hosts["web1"].ok, 0);
        assert_eq!(summary.hosts["web2"].ok, 1);
        assert_eq!(summary.hosts["web2"].ignored, 1);
        assert_eq!(summary.hosts["db1"].unreachable, 1);
        assert!(summary.has_failures());
        assert_eq!(summary.output_bytes, 27);
    }

    #[test]
    fn test_human_render() {
        let summary = SummaryArgs::collect(&run()[..]).unwrap();
        let args = SummaryArgs {
            file: None,
            json: false,
        };
        let mut out = Vec::new();
        args.render(&OutputFormatter::new(false, false, 0), &summary, &mut out)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Playbook: site.yml\n6 events, 6 completed\n"));
        assert!(text.contains(&format!("{:<21} | 2", "runner_on_ok")));
        assert!(text.contains(&format!("{:<30} : ok=1", "web2")));
        assert!(text.contains("unreachable=1"));
    }

    #[test]
    fn test_json_render() {
        let summary = SummaryArgs::collect(&run()[..]).unwrap();
        let args = SummaryArgs {
            file: None,
            json: true,
        };
        let mut out = Vec::new();
        args.render(&OutputFormatter::new(false, true, 0), &summary, &mut out)
            .unwrap();

        let value: JsonValue = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["events"]["runner_on_failed"], 1);
        assert_eq!(value["hosts"]["db1"]["unreachable"], 1);
    }
}
