//! Event dispatcher.
//!
//! [`EventDispatcher`] turns each lifecycle hook into exactly one captured
//! event and keeps the global context in step with the run:
//!
//! ```text
//! NoPlaybook -> PlaybookActive -> PlayActive -> TaskActive
//! ```
//!
//! `playbook_on_start` opens the playbook, `playbook_on_play_start` replaces
//! the play (clearing the task), `playbook_on_task_start` replaces the task
//! and `playbook_on_stats` clears play and task again. Runner hooks never
//! touch the global layer.
//!
//! An output style ([`DisplayCallback`]) is composed in and writes its text
//! inside each event scope.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use super::config::{EventsConfig, OutputStyle};
use super::context::EventContext;
use super::emitter::{EventData, EventEmitter};
use super::plugins::{DefaultDisplay, MinimalDisplay};
use super::record::RecordOptions;
use super::types::{
    generate_uuid, EventName, HandlerInfo, HostInfo, IncludedFile, PlayInfo, PlaybookInfo,
    PlaybookStats, RunnerResult, TaskInfo, VarsPrompt,
};
use super::wire::EventWriter;
use crate::error::{Error, Result};
use crate::traits::{DisplayCallback, PlaybookCallback};

/// Actions whose results carry gathered facts.
const FACT_ACTIONS: [&str; 2] = ["setup", "gather_facts"];

/// Keys written by `set_play`.
const PLAY_KEYS: [&str; 3] = ["play", "play_uuid", "play_pattern"];

/// Callback that reports every lifecycle hook as a framed event record.
pub struct EventDispatcher {
    emitter: EventEmitter,
    display: Box<dyn DisplayCallback>,
    /// Task UUIDs whose start has been reported
    task_uuids: Mutex<HashSet<String>>,
    /// How often each play UUID has started
    play_counts: Mutex<HashMap<String, u32>>,
    playbook_uuid: RwLock<Option<String>>,
    artifacts_dir: Option<PathBuf>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("display", &self.display.name())
            .field("playbook_uuid", &*self.playbook_uuid.read())
            .field("seen_tasks", &self.task_uuids.lock().len())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher writing to `writer` with the default output style.
    pub fn new(writer: EventWriter) -> Self {
        Self::with_options(writer, RecordOptions::default())
    }

    /// Create a dispatcher with explicit record options.
    pub fn with_options(writer: EventWriter, options: RecordOptions) -> Self {
        let context = Arc::new(EventContext::with_options(options));
        Self {
            emitter: EventEmitter::new(context, Arc::new(writer)),
            display: Box::new(DefaultDisplay::new()),
            task_uuids: Mutex::new(HashSet::new()),
            play_counts: Mutex::new(HashMap::new()),
            playbook_uuid: RwLock::new(None),
            artifacts_dir: None,
        }
    }

    /// Build a dispatcher from configuration, opening its output stream.
    pub fn from_config(config: &EventsConfig) -> Result<Self> {
        config.validate()?;
        let writer = EventWriter::from_config(config)?;
        let mut dispatcher = Self::with_options(writer, RecordOptions::from(config))
            .with_display_args(config.display_args_to_stdout);
        dispatcher.display = match config.style {
            OutputStyle::Default => Box::new(DefaultDisplay::new().with_colors(config.use_colors)),
            OutputStyle::Minimal => Box::new(MinimalDisplay::new().with_colors(config.use_colors)),
        };
        dispatcher.artifacts_dir = config.artifacts_dir();
        Ok(dispatcher)
    }

    /// Replace the output style.
    pub fn with_display(mut self, display: impl DisplayCallback + 'static) -> Self {
        self.display = Box::new(display);
        self
    }

    /// Whether `task_args` carries the rendered task arguments.
    pub fn with_display_args(mut self, display_args: bool) -> Self {
        self.emitter = self.emitter.with_display_args(display_args);
        self
    }

    /// Directory receiving the `custom` set_stats artifact.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// The shared execution context.
    pub fn context(&self) -> &Arc<EventContext> {
        self.emitter.context()
    }

    /// The emitter used for every event.
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// UUID generated for the current playbook.
    pub fn playbook_uuid(&self) -> Option<String> {
        self.playbook_uuid.read().clone()
    }

    /// Number of distinct task UUIDs reported so far.
    pub fn seen_task_count(&self) -> usize {
        self.task_uuids.lock().len()
    }

    // ========================================================================
    // Global Transitions
    // ========================================================================

    /// Start a playbook: new playbook UUID, no play, no task.
    pub fn set_playbook(&self, playbook: &PlaybookInfo) -> String {
        let uuid = generate_uuid();
        *self.playbook_uuid.write() = Some(uuid.clone());
        self.context().add_global([
            ("playbook", JsonValue::from(playbook.file_name.as_str())),
            ("playbook_uuid", JsonValue::from(uuid.as_str())),
        ]);
        self.clear_play();
        uuid
    }

    /// Make `play` the active play and drop the active task.
    pub fn set_play(&self, play: &PlayInfo) {
        self.context().add_global([
            ("play", JsonValue::from(play.display_name())),
            ("play_uuid", JsonValue::from(play.uuid.as_str())),
            ("play_pattern", JsonValue::from(play.pattern())),
        ]);
        self.clear_task();
    }

    /// Drop the active play and task.
    pub fn clear_play(&self) {
        self.context().remove_global(PLAY_KEYS);
        self.clear_task();
    }

    /// Make `task` the active task.
    pub fn set_task(&self, task: &TaskInfo) {
        self.emitter.set_task(task);
    }

    /// Drop the active task.
    pub fn clear_task(&self) {
        self.emitter.clear_task();
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn emit<F>(&self, event: EventName, data: EventData, show: F) -> Result<()>
    where
        F: FnOnce(&dyn DisplayCallback, &mut dyn Write) -> io::Result<()>,
    {
        self.emitter.capture(event, data, |scope| {
            scope.display(|out| show(self.display.as_ref(), out))
        })
    }

    /// Record a task start, returning false for a repeat.
    fn first_start(&self, task: &TaskInfo) -> bool {
        let first = self.task_uuids.lock().insert(task.uuid.clone());
        if !first {
            debug!(task_uuid = %task.uuid, "suppressing duplicate task start");
        }
        first
    }

    /// Play UUID with a `_N` suffix for the Nth start of the same play.
    fn play_uuid_for(&self, play: &PlayInfo) -> String {
        let mut counts = self.play_counts.lock();
        let count = counts.entry(play.uuid.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            format!("{}_{}", play.uuid, count)
        } else {
            play.uuid.clone()
        }
    }

    fn task_start_data(task: &TaskInfo, is_conditional: bool) -> EventData {
        EventData::new()
            .with("name", task.display_name())
            .with("is_conditional", is_conditional)
            .with_uuid(task.uuid.as_str())
            .with_task(task.clone())
    }

    fn runner_data(result: &RunnerResult) -> EventData {
        EventData::new()
            .with("host", result.host.name.as_str())
            .with_task(result.task.clone())
    }

    fn host_result_data(result: &RunnerResult) -> EventData {
        Self::runner_data(result).with("remote_addr", result.host.address.as_str())
    }

    fn event_loop(task: &TaskInfo) -> JsonValue {
        task.loop_with
            .as_deref()
            .map_or(JsonValue::Null, JsonValue::from)
    }

    fn async_data(result: &RunnerResult) -> EventData {
        Self::runner_data(result)
            .with_res(result.result.clone())
            .with("jid", result.get("ansible_job_id").cloned().unwrap_or(JsonValue::Null))
    }

    fn write_run_artifacts(&self, data: &JsonValue) -> Result<()> {
        let Some(dir) = &self.artifacts_dir else {
            warn!("set_stats data present but no private data directory is configured");
            return Ok(());
        };
        write_custom_artifact(dir, data)
    }
}

/// Write `data` as JSON to `<dir>/custom`, readable by the owner only.
fn write_custom_artifact(dir: &Path, data: &JsonValue) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| Error::artifact(dir, e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| Error::artifact(dir, e.to_string()))?;
        }
    }

    let path = dir.join("custom");
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options
        .open(&path)
        .map_err(|e| Error::artifact(&path, e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::artifact(&path, e.to_string()))?;
    }

    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, data)?;
    writer
        .flush()
        .map_err(|e| Error::artifact(&path, e.to_string()))?;
    debug!(path = %path.display(), "wrote custom stats artifact");
    Ok(())
}

// ============================================================================
// Lifecycle Hooks
// ============================================================================

impl PlaybookCallback for EventDispatcher {
    fn playbook_on_start(&self, playbook: &PlaybookInfo) -> Result<()> {
        let uuid = self.set_playbook(playbook);
        self.emit(
            EventName::PlaybookOnStart,
            EventData::new().with_uuid(uuid),
            |display, out| display.playbook_start(out, playbook),
        )
    }

    fn playbook_on_play_start(&self, play: &PlayInfo) -> Result<()> {
        if !self.display.reports_play_and_task_starts() {
            return Ok(());
        }
        let play = play.clone().with_uuid(self.play_uuid_for(play));
        self.set_play(&play);
        let data = EventData::new()
            .with("name", play.display_name())
            .with("pattern", play.pattern())
            .with_uuid(play.uuid.as_str());
        self.emit(EventName::PlaybookOnPlayStart, data, |display, out| {
            display.play_start(out, &play)
        })
    }

    fn playbook_on_task_start(&self, task: &TaskInfo, is_conditional: bool) -> Result<()> {
        if !self.display.reports_play_and_task_starts() {
            self.set_task(task);
            return Ok(());
        }
        if !self.first_start(task) {
            return Ok(());
        }
        self.set_task(task);
        self.emit(
            EventName::PlaybookOnTaskStart,
            Self::task_start_data(task, is_conditional),
            |display, out| display.task_start(out, task, "TASK"),
        )
    }

    fn playbook_on_handler_task_start(&self, task: &TaskInfo) -> Result<()> {
        if !self.first_start(task) {
            return Ok(());
        }
        self.set_task(task);
        self.emit(
            EventName::PlaybookOnTaskStart,
            Self::task_start_data(task, true),
            |display, out| display.task_start(out, task, "RUNNING HANDLER"),
        )
    }

    fn playbook_on_cleanup_task_start(&self, task: &TaskInfo) -> Result<()> {
        self.set_task(task);
        self.emit(
            EventName::PlaybookOnTaskStart,
            Self::task_start_data(task, true),
            |display, out| display.task_start(out, task, "CLEANUP TASK"),
        )
    }

    fn playbook_on_stats(&self, stats: &PlaybookStats) -> Result<()> {
        self.clear_play();

        if let Some(custom) = stats.run_artifacts() {
            self.write_run_artifacts(custom)?;
        }

        let data = EventData::new()
            .with("changed", json!(stats.changed))
            .with("dark", json!(stats.dark))
            .with("failures", json!(stats.failures))
            .with("ignored", json!(stats.ignored))
            .with("ok", json!(stats.ok))
            .with("processed", json!(stats.processed))
            .with("rescued", json!(stats.rescued))
            .with("skipped", json!(stats.skipped));
        self.emit(EventName::PlaybookOnStats, data, |display, out| {
            display.stats(out, stats)
        })
    }

    fn playbook_on_vars_prompt(&self, prompt: &VarsPrompt) -> Result<()> {
        let data = EventData::new()
            .with("varname", prompt.varname.as_str())
            .with("private", prompt.private)
            .with("prompt", json!(prompt.prompt))
            .with("encrypt", json!(prompt.encrypt))
            .with("confirm", prompt.confirm)
            .with("salt_size", json!(prompt.salt_size))
            .with("salt", json!(prompt.salt))
            .with("default", json!(prompt.default));
        self.emit(EventName::PlaybookOnVarsPrompt, data, |_, _| Ok(()))
    }

    fn playbook_on_include(&self, included: &IncludedFile) -> Result<()> {
        let data = EventData::new().with("included_file", included.filename.as_str());
        self.emit(EventName::PlaybookOnInclude, data, |display, out| {
            display.include(out, included)
        })
    }

    fn playbook_on_import_for_host(&self, host: &HostInfo, imported_file: &str) -> Result<()> {
        debug!(host = %host.name, file = imported_file, "import for host");
        self.emit(EventName::PlaybookOnImportForHost, EventData::new(), |_, _| Ok(()))
    }

    fn playbook_on_not_import_for_host(&self, host: &HostInfo, missing_file: &str) -> Result<()> {
        debug!(host = %host.name, file = missing_file, "not imported for host");
        self.emit(EventName::PlaybookOnNotImportForHost, EventData::new(), |_, _| Ok(()))
    }

    fn playbook_on_setup(&self) -> Result<()> {
        self.emit(EventName::PlaybookOnSetup, EventData::new(), |_, _| Ok(()))
    }

    fn playbook_on_no_hosts_matched(&self) -> Result<()> {
        self.emit(EventName::PlaybookOnNoHostsMatched, EventData::new(), |display, out| {
            display.no_hosts_matched(out)
        })
    }

    fn playbook_on_no_hosts_remaining(&self) -> Result<()> {
        self.emit(EventName::PlaybookOnNoHostsRemaining, EventData::new(), |display, out| {
            display.no_hosts_remaining(out)
        })
    }

    fn playbook_on_notify(&self, handler: &HandlerInfo, host: &HostInfo) -> Result<()> {
        let data = EventData::new()
            .with("host", host.name.as_str())
            .with("handler", handler.name.as_str());
        self.emit(EventName::PlaybookOnNotify, data, |_, _| Ok(()))
    }

    fn runner_on_start(&self, host: &HostInfo, task: &TaskInfo) -> Result<()> {
        let data = EventData::new()
            .with("host", host.name.as_str())
            .with_task(task.clone());
        self.emit(EventName::RunnerOnStart, data, |_, _| Ok(()))
    }

    fn runner_on_ok(&self, result: &RunnerResult) -> Result<()> {
        let mut res = result.result.clone();
        if FACT_ACTIONS.contains(&result.task.action.as_str()) {
            if let Some(facts) = res
                .get_mut("ansible_facts")
                .and_then(JsonValue::as_object_mut)
            {
                facts.remove("ansible_env");
            }
        }
        let data = Self::host_result_data(result)
            .with_res(res)
            .with("event_loop", Self::event_loop(&result.task));
        self.emit(EventName::RunnerOnOk, data, |display, out| {
            display.runner_ok(out, result)
        })
    }

    fn runner_on_failed(&self, result: &RunnerResult, ignore_errors: bool) -> Result<()> {
        let data = Self::host_result_data(result)
            .with_res(result.result.clone())
            .with("ignore_errors", ignore_errors)
            .with("event_loop", Self::event_loop(&result.task));
        self.emit(EventName::RunnerOnFailed, data, |display, out| {
            display.runner_failed(out, result, ignore_errors)
        })
    }

    fn runner_on_skipped(&self, result: &RunnerResult) -> Result<()> {
        let data =
            Self::host_result_data(result).with("event_loop", Self::event_loop(&result.task));
        self.emit(EventName::RunnerOnSkipped, data, |display, out| {
            display.runner_skipped(out, result)
        })
    }

    fn runner_on_unreachable(&self, result: &RunnerResult) -> Result<()> {
        let data = Self::host_result_data(result).with_res(result.result.clone());
        self.emit(EventName::RunnerOnUnreachable, data, |display, out| {
            display.runner_unreachable(out, result)
        })
    }

    fn runner_on_no_hosts(&self, task: &TaskInfo) -> Result<()> {
        self.emit(
            EventName::RunnerOnNoHosts,
            EventData::new().with_task(task.clone()),
            |_, _| Ok(()),
        )
    }

    fn runner_on_async_poll(&self, result: &RunnerResult) -> Result<()> {
        self.emit(EventName::RunnerOnAsyncPoll, Self::async_data(result), |_, _| Ok(()))
    }

    fn runner_on_async_ok(&self, result: &RunnerResult) -> Result<()> {
        self.emit(EventName::RunnerOnAsyncOk, Self::async_data(result), |display, out| {
            display.runner_ok(out, result)
        })
    }

    fn runner_on_async_failed(&self, result: &RunnerResult) -> Result<()> {
        self.emit(EventName::RunnerOnAsyncFailed, Self::async_data(result), |display, out| {
            display.runner_failed(out, result, false)
        })
    }

    fn runner_on_file_diff(&self, result: &RunnerResult, diff: &JsonValue) -> Result<()> {
        let data = Self::runner_data(result).with("diff", diff.clone());
        self.emit(EventName::RunnerOnFileDiff, data, |display, out| {
            display.file_diff(out, &result.host, diff)
        })
    }

    fn on_file_diff(&self, result: &RunnerResult) -> Result<()> {
        let diff = result.get("diff").cloned().unwrap_or(JsonValue::Null);
        self.runner_on_file_diff(result, &diff)
    }

    fn runner_item_on_ok(&self, result: &RunnerResult) -> Result<()> {
        let data = Self::runner_data(result).with_res(result.result.clone());
        self.emit(EventName::RunnerItemOnOk, data, |display, out| {
            display.runner_item(out, result, "ok")
        })
    }

    fn runner_item_on_failed(&self, result: &RunnerResult) -> Result<()> {
        let data = Self::runner_data(result).with_res(result.result.clone());
        self.emit(EventName::RunnerItemOnFailed, data, |display, out| {
            display.runner_item(out, result, "failed")
        })
    }

    fn runner_item_on_skipped(&self, result: &RunnerResult) -> Result<()> {
        let data = Self::runner_data(result).with_res(result.result.clone());
        self.emit(EventName::RunnerItemOnSkipped, data, |display, out| {
            display.runner_item(out, result, "skipping")
        })
    }

    fn runner_retry(&self, result: &RunnerResult) -> Result<()> {
        let data = Self::runner_data(result).with_res(result.result.clone());
        self.emit(EventName::RunnerRetry, data, |display, out| {
            display.runner_retry(out, result)
        })
    }
}
