//! Event names and the narrow native shapes handed over by the orchestrator.
//!
//! The dispatcher never sees the orchestrator's full object model. An adapter
//! populates these structs with the handful of fields the event stream needs:
//! names, UUIDs, host name and address, action, arguments, the result payload
//! and the no-log flag.
//!
//! ## Event Categories
//!
//! - **Playbook Events**: playbook start and final stats
//! - **Play Events**: play start
//! - **Task Events**: task, handler and cleanup task starts
//! - **Runner Events**: per-host results, loop items, async polling, retries

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Ordered attribute map used for context layers and event payloads.
pub type Attributes = IndexMap<String, JsonValue>;

/// Generate a random identifier for events, playbooks and tasks.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Event Names
// ============================================================================

/// The fixed set of lifecycle event names written to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    PlaybookOnStart,
    PlaybookOnStats,
    PlaybookOnPlayStart,
    PlaybookOnTaskStart,
    PlaybookOnVarsPrompt,
    PlaybookOnInclude,
    PlaybookOnImportForHost,
    PlaybookOnNotImportForHost,
    PlaybookOnSetup,
    PlaybookOnNoHostsMatched,
    PlaybookOnNoHostsRemaining,
    PlaybookOnNotify,
    RunnerOnStart,
    RunnerOnOk,
    RunnerOnFailed,
    RunnerOnSkipped,
    RunnerOnUnreachable,
    RunnerOnNoHosts,
    RunnerOnAsyncPoll,
    RunnerOnAsyncOk,
    RunnerOnAsyncFailed,
    RunnerOnFileDiff,
    RunnerItemOnOk,
    RunnerItemOnFailed,
    RunnerItemOnSkipped,
    RunnerRetry,
}

impl EventName {
    /// Every event name, in declaration order.
    pub const ALL: [EventName; 26] = [
        EventName::PlaybookOnStart,
        EventName::PlaybookOnStats,
        EventName::PlaybookOnPlayStart,
        EventName::PlaybookOnTaskStart,
        EventName::PlaybookOnVarsPrompt,
        EventName::PlaybookOnInclude,
        EventName::PlaybookOnImportForHost,
        EventName::PlaybookOnNotImportForHost,
        EventName::PlaybookOnSetup,
        EventName::PlaybookOnNoHostsMatched,
        EventName::PlaybookOnNoHostsRemaining,
        EventName::PlaybookOnNotify,
        EventName::RunnerOnStart,
        EventName::RunnerOnOk,
        EventName::RunnerOnFailed,
        EventName::RunnerOnSkipped,
        EventName::RunnerOnUnreachable,
        EventName::RunnerOnNoHosts,
        EventName::RunnerOnAsyncPoll,
        EventName::RunnerOnAsyncOk,
        EventName::RunnerOnAsyncFailed,
        EventName::RunnerOnFileDiff,
        EventName::RunnerItemOnOk,
        EventName::RunnerItemOnFailed,
        EventName::RunnerItemOnSkipped,
        EventName::RunnerRetry,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PlaybookOnStart => "playbook_on_start",
            EventName::PlaybookOnStats => "playbook_on_stats",
            EventName::PlaybookOnPlayStart => "playbook_on_play_start",
            EventName::PlaybookOnTaskStart => "playbook_on_task_start",
            EventName::PlaybookOnVarsPrompt => "playbook_on_vars_prompt",
            EventName::PlaybookOnInclude => "playbook_on_include",
            EventName::PlaybookOnImportForHost => "playbook_on_import_for_host",
            EventName::PlaybookOnNotImportForHost => "playbook_on_not_import_for_host",
            EventName::PlaybookOnSetup => "playbook_on_setup",
            EventName::PlaybookOnNoHostsMatched => "playbook_on_no_hosts_matched",
            EventName::PlaybookOnNoHostsRemaining => "playbook_on_no_hosts_remaining",
            EventName::PlaybookOnNotify => "playbook_on_notify",
            EventName::RunnerOnStart => "runner_on_start",
            EventName::RunnerOnOk => "runner_on_ok",
            EventName::RunnerOnFailed => "runner_on_failed",
            EventName::RunnerOnSkipped => "runner_on_skipped",
            EventName::RunnerOnUnreachable => "runner_on_unreachable",
            EventName::RunnerOnNoHosts => "runner_on_no_hosts",
            EventName::RunnerOnAsyncPoll => "runner_on_async_poll",
            EventName::RunnerOnAsyncOk => "runner_on_async_ok",
            EventName::RunnerOnAsyncFailed => "runner_on_async_failed",
            EventName::RunnerOnFileDiff => "runner_on_file_diff",
            EventName::RunnerItemOnOk => "runner_item_on_ok",
            EventName::RunnerItemOnFailed => "runner_item_on_failed",
            EventName::RunnerItemOnSkipped => "runner_item_on_skipped",
            EventName::RunnerRetry => "runner_retry",
        }
    }

    /// Events that never belong to a play.
    pub fn has_play(&self) -> bool {
        !matches!(
            self,
            EventName::PlaybookOnStart | EventName::PlaybookOnStats
        )
    }

    /// Events that never carry a task.
    ///
    /// A task handed to one of these events is ignored rather than expanded
    /// into task identity fields.
    pub fn has_task(&self) -> bool {
        self.has_play()
            && !matches!(
                self,
                EventName::PlaybookOnSetup
                    | EventName::PlaybookOnNotify
                    | EventName::PlaybookOnImportForHost
                    | EventName::PlaybookOnNotImportForHost
                    | EventName::PlaybookOnNoHostsMatched
                    | EventName::PlaybookOnNoHostsRemaining
            )
    }

    /// Whether this event reports the outcome of a task on one host.
    pub fn is_runner_event(&self) -> bool {
        self.as_str().starts_with("runner_")
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event name '{}'", s))
    }
}

// ============================================================================
// Playbook / Play
// ============================================================================

/// Information about a playbook being executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookInfo {
    /// File name of the playbook, `???` when the orchestrator does not know it
    pub file_name: String,
}

impl PlaybookInfo {
    /// Create a new PlaybookInfo.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Default for PlaybookInfo {
    fn default() -> Self {
        Self::new("???")
    }
}

/// Host selection of a play: either an explicit host list or a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostPattern {
    /// Explicit host list, joined with commas for display
    List(Vec<String>),
    /// Inventory pattern such as `webservers:&prod`
    Pattern(String),
}

impl HostPattern {
    /// Render the pattern the way it is reported in `play_pattern`.
    pub fn to_pattern(&self) -> String {
        match self {
            HostPattern::List(hosts) => hosts.join(","),
            HostPattern::Pattern(p) => p.clone(),
        }
    }
}

/// Information about a play being executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayInfo {
    /// Name of the play (may be blank)
    pub name: String,
    /// Host selection, absent for synthetic plays
    pub hosts: Option<HostPattern>,
    /// Unique play identifier
    pub uuid: String,
}

impl PlayInfo {
    /// Create a new PlayInfo with a fresh UUID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: None,
            uuid: generate_uuid(),
        }
    }

    /// Set an explicit host list.
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = Some(HostPattern::List(
            hosts.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Set an inventory pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.hosts = Some(HostPattern::Pattern(pattern.into()));
        self
    }

    /// Set the play UUID.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Host pattern string, empty when the play has no hosts.
    pub fn pattern(&self) -> String {
        self.hosts
            .as_ref()
            .map(HostPattern::to_pattern)
            .unwrap_or_default()
    }

    /// Name reported for the play, falling back to the pattern when blank.
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            self.pattern()
        } else {
            name.to_string()
        }
    }
}

// ============================================================================
// Task / Host
// ============================================================================

/// Information about a task, handler or cleanup task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task name as written in the playbook (may be empty)
    pub name: String,
    /// Action (module) executed by the task
    pub action: String,
    /// Unique task identifier
    pub uuid: String,
    /// `file:line` location of the task, when known
    pub path: Option<String>,
    /// Module arguments
    #[serde(default)]
    pub args: IndexMap<String, JsonValue>,
    /// Whether output of this task must be hidden
    pub no_log: bool,
    /// Owning role, if any
    pub role: Option<String>,
    /// Loop lookup (`items`, `dict`, ...) if the task loops
    pub loop_with: Option<String>,
}

impl TaskInfo {
    /// Create a new TaskInfo with a fresh UUID.
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            uuid: generate_uuid(),
            ..Default::default()
        }
    }

    /// Set the task UUID.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Set the task path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a module argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Set the no_log flag.
    pub fn with_no_log(mut self, no_log: bool) -> Self {
        self.no_log = no_log;
        self
    }

    /// Set the owning role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the loop lookup.
    pub fn with_loop(mut self, loop_with: impl Into<String>) -> Self {
        self.loop_with = Some(loop_with.into());
        self
    }

    /// The task name, or its action when unnamed.
    pub fn name_or_action(&self) -> &str {
        if self.name.is_empty() {
            &self.action
        } else {
            &self.name
        }
    }

    /// Display name, prefixed with the role (`role : name`).
    pub fn display_name(&self) -> String {
        match self.role.as_deref().filter(|r| !r.is_empty()) {
            Some(role) => format!("{} : {}", role, self.name_or_action()),
            None => self.name_or_action().to_string(),
        }
    }

    /// Arguments rendered as `k=v, k=v`.
    pub fn args_string(&self) -> String {
        self.args
            .iter()
            .map(|(k, v)| match v {
                JsonValue::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A target host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Inventory name
    pub name: String,
    /// Address used to reach the host (defaults to the name)
    pub address: String,
}

impl HostInfo {
    /// Create a host whose address equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            address: name.clone(),
            name,
        }
    }

    /// Set the address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

/// The outcome of one task on one host, as handed to runner hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    /// Host the task ran on
    pub host: HostInfo,
    /// Task that produced the result
    pub task: TaskInfo,
    /// Raw module result
    pub result: JsonValue,
}

impl RunnerResult {
    /// Create a new runner result.
    pub fn new(host: HostInfo, task: TaskInfo, result: JsonValue) -> Self {
        Self { host, task, result }
    }

    /// Look up a top-level field of the result.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.result.get(key)
    }
}

// ============================================================================
// Misc Hook Payloads
// ============================================================================

/// A notified handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfo {
    /// Handler name
    pub name: String,
}

impl HandlerInfo {
    /// Create a handler reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A file pulled in by `include_tasks` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludedFile {
    /// Included file name
    pub filename: String,
}

impl IncludedFile {
    /// Create an included file reference.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// A `vars_prompt` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarsPrompt {
    pub varname: String,
    pub private: bool,
    pub prompt: Option<String>,
    pub encrypt: Option<String>,
    pub confirm: bool,
    pub salt_size: Option<u32>,
    pub salt: Option<String>,
    pub default: Option<String>,
}

impl VarsPrompt {
    /// Create a private prompt for `varname`.
    pub fn new(varname: impl Into<String>) -> Self {
        Self {
            varname: varname.into(),
            private: true,
            ..Default::default()
        }
    }
}

/// Per-host counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookStats {
    pub processed: IndexMap<String, u64>,
    pub failures: IndexMap<String, u64>,
    pub ok: IndexMap<String, u64>,
    /// Unreachable hosts
    pub dark: IndexMap<String, u64>,
    pub changed: IndexMap<String, u64>,
    pub skipped: IndexMap<String, u64>,
    pub rescued: IndexMap<String, u64>,
    pub ignored: IndexMap<String, u64>,
    /// `set_stats` data keyed by host, `_run` for run-wide data
    #[serde(default)]
    pub custom: IndexMap<String, JsonValue>,
}

impl PlaybookStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` ok tasks for `host`.
    pub fn with_ok(mut self, host: impl Into<String>, count: u64) -> Self {
        let host = host.into();
        self.processed.insert(host.clone(), 1);
        self.ok.insert(host, count);
        self
    }

    /// Record `count` changed tasks for `host`.
    pub fn with_changed(mut self, host: impl Into<String>, count: u64) -> Self {
        let host = host.into();
        self.processed.insert(host.clone(), 1);
        self.changed.insert(host, count);
        self
    }

    /// Record `count` failed tasks for `host`.
    pub fn with_failures(mut self, host: impl Into<String>, count: u64) -> Self {
        let host = host.into();
        self.processed.insert(host.clone(), 1);
        self.failures.insert(host, count);
        self
    }

    /// Record `host` as unreachable.
    pub fn with_dark(mut self, host: impl Into<String>, count: u64) -> Self {
        let host = host.into();
        self.processed.insert(host.clone(), 1);
        self.dark.insert(host, count);
        self
    }

    /// Record `count` skipped tasks for `host`.
    pub fn with_skipped(mut self, host: impl Into<String>, count: u64) -> Self {
        let host = host.into();
        self.processed.insert(host.clone(), 1);
        self.skipped.insert(host, count);
        self
    }

    /// Attach run-wide `set_stats` data.
    pub fn with_custom_run_data(mut self, data: JsonValue) -> Self {
        self.custom.insert("_run".to_string(), data);
        self
    }

    /// Run-wide custom data, if any was set.
    pub fn run_artifacts(&self) -> Option<&JsonValue> {
        self.custom
            .get("_run")
            .filter(|v| !matches!(v, JsonValue::Null) && v.as_object().map_or(true, |m| !m.is_empty()))
    }

    /// Every host that appears in any counter, in first-seen order.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: IndexMap<String, ()> = IndexMap::new();
        for map in [
            &self.processed,
            &self.ok,
            &self.changed,
            &self.failures,
            &self.dark,
            &self.skipped,
            &self.rescued,
            &self.ignored,
        ] {
            for host in map.keys() {
                hosts.entry(host.clone()).or_insert(());
            }
        }
        hosts.into_keys().collect()
    }

    /// Counter for `host` in `map`, zero when absent.
    pub fn count(map: &IndexMap<String, u64>, host: &str) -> u64 {
        map.get(host).copied().unwrap_or(0)
    }
}
