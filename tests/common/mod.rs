//! Shared test utilities for the Rustible Events test suite.
//!
//! This module provides:
//! - An in-memory output stream that a dispatcher can write to
//! - Helpers decoding what was written back into records
//! - Small builders for hosts, tasks and results
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use rustible_events::callback::wire::decode_stream;
use rustible_events::callback::{
    Attributes, DefaultDisplay, EventDispatcher, EventWriter, HostInfo, RunnerResult, StreamItem,
    TaskInfo,
};

// ============================================================================
// Capture Buffer
// ============================================================================

/// Output stream shared between a writer and the test.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Decode the stream into items.
    pub fn items(&self) -> Vec<StreamItem> {
        decode_stream(&self.bytes()).expect("captured stream decodes")
    }

    /// Decode the stream and keep only the begin records.
    pub fn records(&self) -> Vec<Attributes> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Event(attrs) => Some(attrs),
                _ => None,
            })
            .collect()
    }

    /// Event names in stream order.
    pub fn event_names(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r["event"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Plain display text, concatenated.
    pub fn display_text(&self) -> String {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Output(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Dispatcher with uncolored default output writing into a fresh buffer.
pub fn capture_dispatcher() -> (EventDispatcher, CaptureBuffer) {
    let buffer = CaptureBuffer::new();
    let dispatcher = EventDispatcher::new(EventWriter::new(buffer.clone()))
        .with_display(DefaultDisplay::new().with_colors(false));
    (dispatcher, buffer)
}

pub fn host(name: &str) -> HostInfo {
    HostInfo::new(name).with_address(format!("10.0.0.{}", name.len()))
}

pub fn task(name: &str, action: &str, uuid: &str) -> TaskInfo {
    TaskInfo::new(name, action).with_uuid(uuid)
}

pub fn result(host_name: &str, task: &TaskInfo, res: JsonValue) -> RunnerResult {
    RunnerResult::new(host(host_name), task.clone(), res)
}

/// Collect every string found anywhere in `value`.
pub fn all_strings(value: &JsonValue) -> Vec<String> {
    let mut out = Vec::new();
    collect_strings(value, &mut out);
    out
}

fn collect_strings(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        JsonValue::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
