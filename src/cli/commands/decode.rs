//! Decode command - print captured events as JSON lines

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::json;

use super::{for_each_item, open_input, CommandContext};
use crate::callback::wire::StreamItem;

/// Arguments for the decode command
#[derive(Parser, Debug, Clone)]
pub struct DecodeArgs {
    /// Captured stream to read (stdin when omitted or `-`)
    pub file: Option<PathBuf>,

    /// Also print plain display text as `{"stdout": ...}` lines
    #[arg(long)]
    pub with_output: bool,

    /// Only print events with this name (repeatable)
    #[arg(long = "event", value_name = "NAME", action = clap::ArgAction::Append)]
    pub events: Vec<String>,
}

impl DecodeArgs {
    /// Execute the decode command
    pub fn execute(&self, _ctx: &mut CommandContext) -> Result<i32> {
        let input = open_input(self.file.as_deref())?;
        let stdout = io::stdout();
        let mut out = stdout.lock();

        match self.decode(input, &mut out) {
            Ok(count) => {
                tracing::info!(events = count, "stream decoded");
                Ok(0)
            }
            Err(e) if is_broken_pipe(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Decode `input` into `out`, returning the number of events printed.
    pub fn decode<R: Read, W: Write>(&self, input: R, out: &mut W) -> Result<usize> {
        let mut count = 0;
        for_each_item(input, |item| {
            match item {
                StreamItem::Event(attrs) => {
                    if self.wants(&attrs) {
                        serde_json::to_writer(&mut *out, &attrs)?;
                        writeln!(out)?;
                        count += 1;
                    }
                }
                StreamItem::Output(text) if self.with_output => {
                    writeln!(out, "{}", json!({ "stdout": text }))?;
                }
                _ => {}
            }
            Ok(())
        })?;
        out.flush()?;
        Ok(count)
    }

    fn wants(&self, attrs: &crate::callback::types::Attributes) -> bool {
        if self.events.is_empty() {
            return true;
        }
        attrs
            .get("event")
            .and_then(|e| e.as_str())
            .map_or(false, |name| self.events.iter().any(|e| e == name))
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .map_or(false, |e| e.kind() == io::ErrorKind::BrokenPipe)
            || cause
                .downcast_ref::<crate::error::Error>()
                .map_or(false, crate::error::Error::is_broken_pipe)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::wire::{encode_frame, END_FRAME};
    use serde_json::Value as JsonValue;

    fn args(with_output: bool, events: &[&str]) -> DecodeArgs {
        DecodeArgs {
            file: None,
            with_output,
            events: events.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn stream() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(encode_frame(br#"{"event":"playbook_on_start","counter":1}"#, 78));
        bytes.extend(END_FRAME);
        bytes.extend(encode_frame(br#"{"event":"runner_on_ok","host":"web1","counter":2}"#, 78));
        bytes.extend(b"ok: [web1]\n");
        bytes.extend(END_FRAME);
        bytes
    }

    fn lines(out: Vec<u8>) -> Vec<JsonValue> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_event() {
        let mut out = Vec::new();
        let count = args(false, &[]).decode(&stream()[..], &mut out).unwrap();
        assert_eq!(count, 2);
        let lines = lines(out);
        assert_eq!(lines[0]["event"], "playbook_on_start");
        assert_eq!(lines[1]["host"], "web1");
    }

    #[test]
    fn test_with_output() {
        let mut out = Vec::new();
        args(true, &[]).decode(&stream()[..], &mut out).unwrap();
        let lines = lines(out);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["stdout"], "ok: [web1]\n");
    }

    #[test]
    fn test_event_filter() {
        let mut out = Vec::new();
        let count = args(false, &["runner_on_ok"])
            .decode(&stream()[..], &mut out)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(lines(out)[0]["counter"], 2);
    }

    #[test]
    fn test_framing_error_is_reported() {
        let mut bytes = b"\x1b[KQUJD\x1b[9D\x1b[K".to_vec();
        bytes.extend(END_FRAME);
        let err = args(false, &[]).decode(&bytes[..], &mut Vec::new()).unwrap_err();
        assert!(err.downcast_ref::<crate::error::Error>().is_some());
    }
}
