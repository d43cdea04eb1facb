//! Scoped event capture.
//!
//! [`EventEmitter::capture_event_data`] opens an [`EventScope`]: it pushes the
//! event's attributes (and the task's identity, when the event has a task)
//! onto the caller's local context layer and writes the begin record. When
//! the scope closes, by [`EventScope::finish`] or by being dropped during an
//! early return or a panic, the end frame is written and both frames are
//! popped, restoring the local layer exactly.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::censor::{censor_result, is_truthy};
use super::context::{EventContext, LocalFrame};
use super::record::EventRecord;
use super::types::{generate_uuid, Attributes, EventName, TaskInfo};
use super::wire::{EventWriter, StreamGuard};
use crate::error::Result;

/// Keys written by `set_task` and removed by `clear_task`.
pub const TASK_KEYS: [&str; 6] = [
    "task",
    "task_path",
    "task_uuid",
    "task_action",
    "task_args",
    "role",
];

/// Result flags copied to the top level of runner events.
const RESULT_FLAGS: [&str; 2] = ["changed", "failed"];

// ============================================================================
// Event Data
// ============================================================================

/// Attributes of a single event, plus the task it belongs to.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    attrs: Attributes,
    task: Option<TaskInfo>,
}

impl EventData {
    /// Create empty event data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Set the event uuid.
    pub fn with_uuid(self, uuid: impl Into<String>) -> Self {
        self.with("uuid", uuid.into())
    }

    /// Set the task result.
    pub fn with_res(self, res: JsonValue) -> Self {
        self.with("res", res)
    }

    /// Attach the task the event belongs to.
    pub fn with_task(mut self, task: TaskInfo) -> Self {
        self.task = Some(task);
        self
    }

    /// Look up an attribute.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.attrs.get(key)
    }

    /// Attached task, if any.
    pub fn task(&self) -> Option<&TaskInfo> {
        self.task.as_ref()
    }

    /// Attributes of the event.
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }
}

impl From<Attributes> for EventData {
    fn from(attrs: Attributes) -> Self {
        Self { attrs, task: None }
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Writes events for a dispatcher, keeping the context in step.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    context: Arc<EventContext>,
    writer: Arc<EventWriter>,
    display_args: bool,
}

impl EventEmitter {
    /// Create an emitter over a context and an output stream.
    pub fn new(context: Arc<EventContext>, writer: Arc<EventWriter>) -> Self {
        Self {
            context,
            writer,
            display_args: true,
        }
    }

    /// Whether `task_args` carries the rendered task arguments.
    pub fn with_display_args(mut self, display_args: bool) -> Self {
        self.display_args = display_args;
        self
    }

    /// The context events are resolved against.
    pub fn context(&self) -> &Arc<EventContext> {
        &self.context
    }

    /// The output stream.
    pub fn writer(&self) -> &Arc<EventWriter> {
        &self.writer
    }

    /// Task identity fields for `task`.
    ///
    /// `task_args` is left out entirely for no-log tasks.
    pub fn task_attributes(&self, task: &TaskInfo) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("task".into(), task.name_or_action().into());
        if let Some(path) = &task.path {
            attrs.insert("task_path".into(), path.clone().into());
        }
        attrs.insert("task_uuid".into(), task.uuid.clone().into());
        attrs.insert("task_action".into(), task.action.clone().into());
        if !task.no_log {
            let args = if self.display_args {
                task.args_string()
            } else {
                String::new()
            };
            attrs.insert("task_args".into(), args.into());
        }
        if let Some(role) = task.role.as_deref().filter(|r| !r.is_empty()) {
            attrs.insert("role".into(), role.into());
        }
        attrs
    }

    /// Make `task` the active task for every following event.
    pub fn set_task(&self, task: &TaskInfo) {
        self.clear_task();
        self.context.add_global(self.task_attributes(task));
    }

    /// Forget the active task.
    pub fn clear_task(&self) {
        self.context.remove_global(TASK_KEYS);
    }

    /// Open an event scope and write its begin record.
    ///
    /// The uuid is generated when absent and `res` is replaced by its censored
    /// copy. Runner events also get top-level `changed` and `failed` flags
    /// taken from the result. Any `artifact_data` is hoisted to the top level.
    /// A task attached to an event that never has one is ignored.
    pub fn capture_event_data(&self, event: EventName, data: EventData) -> Result<EventScope<'_>> {
        let EventData { mut attrs, task } = data;

        if !attrs.contains_key("uuid") {
            attrs.insert("uuid".into(), generate_uuid().into());
        }

        if let Some(res) = attrs.get("res") {
            let censored = censor_result(res, false);
            if event.is_runner_event() {
                for flag in RESULT_FLAGS {
                    let set = censored.get(flag).map_or(false, is_truthy);
                    attrs.entry(flag.to_string()).or_insert(JsonValue::Bool(set));
                }
            }
            let artifact_data = censored.get("artifact_data").cloned();
            attrs.insert("res".into(), censored);
            if let Some(artifact_data) = artifact_data {
                attrs.insert("artifact_data".into(), artifact_data);
            }
        }

        let task = task.filter(|_| event.has_task());

        // Held until the scope closes so no other thread's frames or output
        // land between this event's begin and end frames.
        let stream = self.writer.lock();
        debug!(event = %event, "enter event scope");
        let event_frame = self.context.push_local(
            std::iter::once(("event".to_string(), JsonValue::from(event.as_str())))
                .chain(attrs),
        );
        let task_frame = task
            .as_ref()
            .map(|task| self.context.push_local(self.task_attributes(task)));

        let mut scope = EventScope {
            emitter: self,
            event,
            event_frame: Some(event_frame),
            task_frame,
            record: None,
            _stream: stream,
        };
        match self.context.dump_begin(&self.writer) {
            Ok(record) => {
                scope.record = Some(record);
                Ok(scope)
            }
            Err(e) => {
                // No begin frame went out, so no end frame may follow.
                scope.restore();
                Err(e)
            }
        }
    }

    /// Run `body` inside an event scope.
    ///
    /// The scope is closed whatever `body` returns; an error from `body` wins
    /// over an error writing the end frame.
    pub fn capture<R, F>(&self, event: EventName, data: EventData, body: F) -> Result<R>
    where
        F: FnOnce(&EventScope<'_>) -> Result<R>,
    {
        let scope = self.capture_event_data(event, data)?;
        let outcome = body(&scope);
        let closed = scope.finish();
        let value = outcome?;
        closed?;
        Ok(value)
    }
}

// ============================================================================
// Event Scope
// ============================================================================

/// An open event. Closing it writes the end frame and restores the local
/// context layer.
///
/// The scope holds the output stream for its whole lifetime, so other
/// threads capturing events wait until it closes. It cannot be sent to
/// another thread.
#[must_use = "dropping the scope immediately ends the event"]
pub struct EventScope<'a> {
    emitter: &'a EventEmitter,
    event: EventName,
    event_frame: Option<LocalFrame>,
    task_frame: Option<LocalFrame>,
    record: Option<EventRecord>,
    _stream: StreamGuard<'a>,
}

impl std::fmt::Debug for EventScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScope")
            .field("event", &self.event)
            .field("open", &self.event_frame.is_some())
            .finish()
    }
}

impl EventScope<'_> {
    /// Event this scope reports.
    pub fn event(&self) -> EventName {
        self.event
    }

    /// The begin record written for this scope.
    pub fn record(&self) -> Option<&EventRecord> {
        self.record.as_ref()
    }

    /// Write display output for this event.
    pub fn display<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
    {
        self.emitter.writer.display(f)
    }

    /// Close the scope, reporting a failure to write the end frame.
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.event_frame.is_none() {
            return Ok(());
        }
        let ended = self.emitter.context.dump_end(&self.emitter.writer);
        self.restore();
        debug!(event = %self.event, "exit event scope");
        ended
    }

    /// Pop the task frame, then the event frame.
    fn restore(&mut self) {
        if let Some(task_frame) = self.task_frame.take() {
            self.emitter.context.pop_local(task_frame);
        }
        if let Some(event_frame) = self.event_frame.take() {
            self.emitter.context.pop_local(event_frame);
        }
    }
}

impl Drop for EventScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(event = %self.event, error = %e, "failed to close event scope");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::test_support::SharedBuffer;
    use crate::callback::wire::{decode_stream, StreamItem};
    use serde_json::json;

    fn emitter() -> (EventEmitter, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let writer = Arc::new(EventWriter::new(buffer.clone()));
        (EventEmitter::new(Arc::new(EventContext::new()), writer), buffer)
    }

    fn events(buffer: &SharedBuffer) -> Vec<Attributes> {
        decode_stream(&buffer.bytes())
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Event(attrs) => Some(attrs),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_scope_writes_begin_and_end() {
        let (emitter, buffer) = emitter();
        let scope = emitter
            .capture_event_data(EventName::PlaybookOnStats, EventData::new())
            .unwrap();
        assert_eq!(emitter.context().get()["event"], json!("playbook_on_stats"));
        scope.finish().unwrap();

        let items = decode_stream(&buffer.bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], StreamItem::EventEnd);
        assert!(emitter.context().local_snapshot().is_empty());
    }

    #[test]
    fn test_task_fields_are_local_to_scope() {
        let (emitter, buffer) = emitter();
        let task = TaskInfo::new("install", "apt").with_uuid("T1");
        emitter
            .capture(
                EventName::RunnerOnOk,
                EventData::new().with("host", "web1").with_task(task),
                |_| Ok(()),
            )
            .unwrap();

        let records = events(&buffer);
        assert_eq!(records[0]["task_uuid"], json!("T1"));
        assert!(emitter.context().get().get("task_uuid").is_none());
    }

    #[test]
    fn test_task_ignored_for_taskless_events() {
        let (emitter, buffer) = emitter();
        let task = TaskInfo::new("install", "apt");
        emitter
            .capture(
                EventName::PlaybookOnNotify,
                EventData::new().with_task(task),
                |_| Ok(()),
            )
            .unwrap();
        assert!(events(&buffer)[0].get("task").is_none());
    }

    #[test]
    fn test_res_is_censored_and_artifacts_hoisted() {
        let (emitter, buffer) = emitter();
        let res = json!({
            "_ansible_no_log": true,
            "stdout": "secret",
            "changed": true,
        });
        emitter
            .capture(EventName::RunnerOnOk, EventData::new().with_res(res), |_| Ok(()))
            .unwrap();
        let record = &events(&buffer)[0];
        assert!(record["res"].get("stdout").is_none());
        assert_eq!(record["res"]["changed"], json!(true));
        assert_eq!(record["changed"], json!(true));
        assert_eq!(record["failed"], json!(false));

        let res = json!({"changed": false, "artifact_data": {"build": 3}});
        emitter
            .capture(EventName::RunnerOnOk, EventData::new().with_res(res), |_| Ok(()))
            .unwrap();
        assert_eq!(events(&buffer)[1]["artifact_data"], json!({"build": 3}));
    }

    #[test]
    fn test_body_error_still_cleans_up() {
        let (emitter, buffer) = emitter();
        let err = emitter
            .capture(EventName::RunnerOnFailed, EventData::new().with("host", "h"), |_| {
                Err::<(), _>(crate::error::Error::Config("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
        assert!(emitter.context().local_snapshot().is_empty());
        assert_eq!(
            decode_stream(&buffer.bytes()).unwrap().last(),
            Some(&StreamItem::EventEnd)
        );
    }

    struct ClosedStream;

    impl std::io::Write for ClosedStream {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_begin_restores_context() {
        let context = Arc::new(EventContext::new());
        let emitter = EventEmitter::new(context.clone(), Arc::new(EventWriter::new(ClosedStream)));
        let err = emitter
            .capture_event_data(EventName::RunnerOnOk, EventData::new().with("host", "h"))
            .unwrap_err();
        assert!(err.is_broken_pipe());
        assert!(context.local_snapshot().is_empty());
    }

    #[test]
    fn test_task_attributes_respect_no_log_and_display_args() {
        let (emitter, _) = emitter();
        let task = TaskInfo::new("", "user")
            .with_arg("password", "x")
            .with_role("accounts");
        let attrs = emitter.task_attributes(&task);
        assert_eq!(attrs["task"], json!("user"));
        assert_eq!(attrs["task_args"], json!("password=x"));
        assert_eq!(attrs["role"], json!("accounts"));

        let attrs = emitter.task_attributes(&task.clone().with_no_log(true));
        assert!(attrs.get("task_args").is_none());

        let quiet = emitter.clone().with_display_args(false);
        assert_eq!(quiet.task_attributes(&task)["task_args"], json!(""));
    }
}
