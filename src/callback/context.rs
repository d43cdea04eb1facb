//! Execution context shared by every event of a run.
//!
//! The context has two layers:
//!
//! - **global**: playbook, play and task identity. Written by the dispatcher
//!   during single-threaded transitions and visible to every event until the
//!   matching clear.
//! - **local**: attributes of the event currently being captured. Each
//!   execution context (thread) has its own local layer, so hosts running
//!   concurrently never see each other's attributes.
//!
//! The global layer is not a general-purpose lock around playbook state:
//! callers are expected to mutate it only from the transition hooks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::trace;

use super::record::{EventRecord, RecordOptions};
use super::types::Attributes;
use super::wire::EventWriter;
use crate::error::Result;

/// Identifies the execution context a local layer belongs to.
pub type ContextKey = ThreadId;

/// Key of the calling execution context.
pub fn current_key() -> ContextKey {
    std::thread::current().id()
}

/// Undo information for one [`EventContext::push_local`].
///
/// Holds the values each pushed key shadowed so that [`EventContext::pop_local`]
/// can put the outer scope back exactly as it was.
#[derive(Debug)]
#[must_use = "a pushed frame must be popped to restore the local layer"]
pub struct LocalFrame {
    key: ContextKey,
    shadowed: Vec<(String, Option<JsonValue>)>,
}

impl LocalFrame {
    /// Keys this frame added or overwrote.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.shadowed.iter().map(|(k, _)| k.as_str())
    }

    /// Execution context the frame was pushed on.
    pub fn context_key(&self) -> ContextKey {
        self.key
    }
}

/// Global plus per-execution-context attribute store.
#[derive(Debug)]
pub struct EventContext {
    global: RwLock<Attributes>,
    local: DashMap<ContextKey, Attributes>,
    counter: AtomicU64,
    options: RecordOptions,
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContext {
    /// Create an empty context with default record options.
    pub fn new() -> Self {
        Self::with_options(RecordOptions::default())
    }

    /// Create an empty context.
    pub fn with_options(options: RecordOptions) -> Self {
        Self {
            global: RwLock::new(Attributes::new()),
            local: DashMap::new(),
            counter: AtomicU64::new(0),
            options,
        }
    }

    /// Record options applied by [`dump_begin`](Self::dump_begin).
    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    // ========================================================================
    // Global Layer
    // ========================================================================

    /// Insert or overwrite global attributes. Last write wins.
    pub fn add_global<I, K>(&self, attrs: I)
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        let mut global = self.global.write();
        for (key, value) in attrs {
            let key = key.into();
            trace!(key = %key, "add global");
            global.insert(key, value);
        }
    }

    /// Remove global attributes. Absent keys are ignored.
    pub fn remove_global<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut global = self.global.write();
        for key in keys {
            if global.shift_remove(key.as_ref()).is_some() {
                trace!(key = key.as_ref(), "remove global");
            }
        }
    }

    /// Copy of the global layer.
    pub fn global_snapshot(&self) -> Attributes {
        self.global.read().clone()
    }

    // ========================================================================
    // Local Layer
    // ========================================================================

    /// Insert or overwrite attributes in the caller's local layer.
    pub fn add_local<I, K>(&self, attrs: I)
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        let mut local = self.local.entry(current_key()).or_default();
        for (key, value) in attrs {
            let key = key.into();
            trace!(key = %key, "add local");
            local.insert(key, value);
        }
    }

    /// Remove attributes from the caller's local layer. Absent keys are ignored.
    pub fn remove_local<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let key = current_key();
        if let Some(mut local) = self.local.get_mut(&key) {
            for k in keys {
                local.shift_remove(k.as_ref());
            }
        }
        self.local.remove_if(&key, |_, attrs| attrs.is_empty());
    }

    /// Add attributes to the caller's local layer, remembering what they shadow.
    pub fn push_local<I, K>(&self, attrs: I) -> LocalFrame
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        let key = current_key();
        let mut shadowed: Vec<(String, Option<JsonValue>)> = Vec::new();
        {
            let mut local = self.local.entry(key).or_default();
            for (k, value) in attrs {
                let k = k.into();
                let previous = local.insert(k.clone(), value);
                // A key repeated within one push keeps its first shadowed value.
                if !shadowed.iter().any(|(seen, _)| *seen == k) {
                    shadowed.push((k, previous));
                }
            }
        }
        trace!(keys = shadowed.len(), "push local frame");
        LocalFrame { key, shadowed }
    }

    /// Undo a [`push_local`](Self::push_local): every key the frame added is
    /// removed and every value it overwrote is put back.
    pub fn pop_local(&self, frame: LocalFrame) {
        let LocalFrame { key, shadowed } = frame;
        if let Some(mut local) = self.local.get_mut(&key) {
            for (k, previous) in shadowed.into_iter().rev() {
                match previous {
                    Some(value) => {
                        local.insert(k, value);
                    }
                    None => {
                        local.shift_remove(&k);
                    }
                }
            }
        }
        self.local.remove_if(&key, |_, attrs| attrs.is_empty());
        trace!("pop local frame");
    }

    /// Copy of the caller's local layer.
    pub fn local_snapshot(&self) -> Attributes {
        self.local_snapshot_for(current_key())
    }

    /// Copy of the local layer of a given execution context.
    pub fn local_snapshot_for(&self, key: ContextKey) -> Attributes {
        self.local
            .get(&key)
            .map(|local| local.clone())
            .unwrap_or_default()
    }

    /// Number of execution contexts with a non-empty local layer.
    pub fn active_local_contexts(&self) -> usize {
        self.local.len()
    }

    // ========================================================================
    // Snapshot & Dump
    // ========================================================================

    /// Merged view: global attributes overlaid by the caller's local ones.
    pub fn get(&self) -> Attributes {
        let mut merged = self.global_snapshot();
        if let Some(local) = self.local.get(&current_key()) {
            for (k, v) in local.iter() {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Next value of the per-run sequence counter, starting at 1.
    pub fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolve the current context into a record without writing it.
    pub fn begin_record(&self) -> EventRecord {
        EventRecord::begin(self.get(), self.next_counter(), &self.options)
    }

    /// Write the begin record for the current context to `writer`.
    pub fn dump_begin(&self, writer: &EventWriter) -> Result<EventRecord> {
        let record = self.begin_record();
        writer.write_record(&record)?;
        Ok(record)
    }

    /// Write the end-of-event marker to `writer`.
    pub fn dump_end(&self, writer: &EventWriter) -> Result<()> {
        writer.write_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_global_add_and_remove() {
        let ctx = EventContext::new();
        ctx.add_global([("play", json!("site")), ("play_uuid", json!("P1"))]);
        ctx.add_global([("play", json!("db"))]);
        assert_eq!(ctx.get()["play"], json!("db"));

        ctx.remove_global(["play", "missing"]);
        assert!(ctx.get().get("play").is_none());
        assert_eq!(ctx.get()["play_uuid"], json!("P1"));
    }

    #[test]
    fn test_local_overlays_global() {
        let ctx = EventContext::new();
        ctx.add_global([("task", json!("global"))]);
        ctx.add_local([("task", json!("local")), ("host", json!("web1"))]);
        let merged = ctx.get();
        assert_eq!(merged["task"], json!("local"));
        assert_eq!(merged["host"], json!("web1"));

        ctx.remove_local(["task", "host"]);
        assert_eq!(ctx.get()["task"], json!("global"));
        assert_eq!(ctx.active_local_contexts(), 0);
    }

    #[test]
    fn test_nested_frames_restore_outer_values() {
        let ctx = EventContext::new();
        let outer = ctx.push_local([("event", json!("outer")), ("host", json!("a"))]);
        let inner = ctx.push_local([("event", json!("inner")), ("res", json!({}))]);
        assert_eq!(ctx.get()["event"], json!("inner"));

        ctx.pop_local(inner);
        let local = ctx.local_snapshot();
        assert_eq!(local["event"], json!("outer"));
        assert!(local.get("res").is_none());
        assert_eq!(local["host"], json!("a"));

        ctx.pop_local(outer);
        assert!(ctx.local_snapshot().is_empty());
    }

    #[test]
    fn test_repeated_key_in_one_push() {
        let ctx = EventContext::new();
        ctx.add_local([("k", json!(0))]);
        let frame = ctx.push_local([("k", json!(1)), ("k", json!(2))]);
        assert_eq!(ctx.get()["k"], json!(2));
        ctx.pop_local(frame);
        assert_eq!(ctx.get()["k"], json!(0));
    }

    #[test]
    fn test_local_layers_are_per_thread() {
        let ctx = Arc::new(EventContext::new());
        ctx.add_local([("host", json!("main"))]);

        let worker = Arc::clone(&ctx);
        let seen = std::thread::spawn(move || {
            let before = worker.get().get("host").cloned();
            worker.add_local([("host", json!("worker"))]);
            let during = worker.get()["host"].clone();
            worker.remove_local(["host"]);
            (before, during)
        })
        .join()
        .unwrap();

        assert_eq!(seen, (None, json!("worker")));
        assert_eq!(ctx.get()["host"], json!("main"));
    }

    #[test]
    fn test_counter_is_monotonic() {
        let ctx = EventContext::new();
        assert_eq!(ctx.next_counter(), 1);
        assert_eq!(ctx.next_counter(), 2);
        let record = ctx.begin_record();
        assert_eq!(record.get("counter"), Some(&json!(3)));
    }
}
