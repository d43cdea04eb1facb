//! Collaborator interfaces.
//!
//! [`PlaybookCallback`] is what the orchestrator calls: one method per
//! lifecycle hook, each receiving the narrow native shapes from
//! [`crate::callback::types`]. [`DisplayCallback`] is an output style that
//! the event dispatcher composes with; its methods run inside the event
//! scope and write human-readable text to the same stream as the records.

use std::io::{self, Write};

use serde_json::Value as JsonValue;

use crate::callback::types::{
    HandlerInfo, HostInfo, IncludedFile, PlayInfo, PlaybookInfo, PlaybookStats, RunnerResult,
    TaskInfo, VarsPrompt,
};
use crate::error::Result;

// ============================================================================
// Lifecycle Hooks
// ============================================================================

/// Lifecycle hooks invoked by the orchestrator.
///
/// Hooks return nothing but a write or serialization failure, which the
/// orchestrator is expected to treat as fatal to the run. All methods have
/// no-op defaults so observers only implement what they need.
///
/// Transition hooks (`playbook_on_start`, `playbook_on_play_start`,
/// `playbook_on_task_start`, `playbook_on_stats`) must not be called
/// concurrently. Runner hooks may be called from several threads at once.
pub trait PlaybookCallback: Send + Sync {
    /// Called when a playbook starts.
    fn playbook_on_start(&self, playbook: &PlaybookInfo) -> Result<()> {
        let _ = playbook;
        Ok(())
    }

    /// Called when a play starts.
    fn playbook_on_play_start(&self, play: &PlayInfo) -> Result<()> {
        let _ = play;
        Ok(())
    }

    /// Called when a task starts. May repeat per host under interleaving strategies.
    fn playbook_on_task_start(&self, task: &TaskInfo, is_conditional: bool) -> Result<()> {
        let _ = (task, is_conditional);
        Ok(())
    }

    /// Called when a handler starts running.
    fn playbook_on_handler_task_start(&self, task: &TaskInfo) -> Result<()> {
        let _ = task;
        Ok(())
    }

    /// Called when a cleanup task starts.
    fn playbook_on_cleanup_task_start(&self, task: &TaskInfo) -> Result<()> {
        let _ = task;
        Ok(())
    }

    /// Called with the final counters of the run.
    fn playbook_on_stats(&self, stats: &PlaybookStats) -> Result<()> {
        let _ = stats;
        Ok(())
    }

    /// Called when a `vars_prompt` entry is processed.
    fn playbook_on_vars_prompt(&self, prompt: &VarsPrompt) -> Result<()> {
        let _ = prompt;
        Ok(())
    }

    /// Called when a file is included.
    fn playbook_on_include(&self, included: &IncludedFile) -> Result<()> {
        let _ = included;
        Ok(())
    }

    /// Called when a vars file is imported for a host.
    fn playbook_on_import_for_host(&self, host: &HostInfo, imported_file: &str) -> Result<()> {
        let _ = (host, imported_file);
        Ok(())
    }

    /// Called when a vars file could not be imported for a host.
    fn playbook_on_not_import_for_host(&self, host: &HostInfo, missing_file: &str) -> Result<()> {
        let _ = (host, missing_file);
        Ok(())
    }

    /// Called before fact gathering.
    fn playbook_on_setup(&self) -> Result<()> {
        Ok(())
    }

    /// Called when a play matched no hosts.
    fn playbook_on_no_hosts_matched(&self) -> Result<()> {
        Ok(())
    }

    /// Called when every host of a play has failed.
    fn playbook_on_no_hosts_remaining(&self) -> Result<()> {
        Ok(())
    }

    /// Called when a handler is notified for a host.
    fn playbook_on_notify(&self, handler: &HandlerInfo, host: &HostInfo) -> Result<()> {
        let _ = (handler, host);
        Ok(())
    }

    /// Called when a task starts on a host.
    fn runner_on_start(&self, host: &HostInfo, task: &TaskInfo) -> Result<()> {
        let _ = (host, task);
        Ok(())
    }

    /// Called when a task succeeds on a host.
    fn runner_on_ok(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a task fails on a host.
    fn runner_on_failed(&self, result: &RunnerResult, ignore_errors: bool) -> Result<()> {
        let _ = (result, ignore_errors);
        Ok(())
    }

    /// Called when a task is skipped on a host.
    fn runner_on_skipped(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a host cannot be reached.
    fn runner_on_unreachable(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a task has no hosts to run on.
    fn runner_on_no_hosts(&self, task: &TaskInfo) -> Result<()> {
        let _ = task;
        Ok(())
    }

    /// Called on each poll of an async task.
    fn runner_on_async_poll(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when an async task finishes successfully.
    fn runner_on_async_ok(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when an async task fails.
    fn runner_on_async_failed(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called with an explicit file diff.
    fn runner_on_file_diff(&self, result: &RunnerResult, diff: &JsonValue) -> Result<()> {
        let _ = (result, diff);
        Ok(())
    }

    /// Called when a result carries a `diff` field.
    fn on_file_diff(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a loop item succeeds.
    fn runner_item_on_ok(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a loop item fails.
    fn runner_item_on_failed(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called when a loop item is skipped.
    fn runner_item_on_skipped(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called before a task is retried.
    fn runner_retry(&self, result: &RunnerResult) -> Result<()> {
        let _ = result;
        Ok(())
    }
}

// ============================================================================
// Output Styles
// ============================================================================

/// An output style composed with event capture.
///
/// Each method receives the locked output stream and runs between the
/// event's begin and end frames.
pub trait DisplayCallback: Send + Sync {
    /// Style name.
    fn name(&self) -> &str;

    /// Whether play and task starts are reported as events.
    ///
    /// A style returning false still tracks task identity, but no
    /// `playbook_on_play_start`/`playbook_on_task_start` records are written.
    fn reports_play_and_task_starts(&self) -> bool {
        true
    }

    fn playbook_start(&self, out: &mut dyn Write, playbook: &PlaybookInfo) -> io::Result<()> {
        let _ = (out, playbook);
        Ok(())
    }

    fn play_start(&self, out: &mut dyn Write, play: &PlayInfo) -> io::Result<()> {
        let _ = (out, play);
        Ok(())
    }

    /// `banner` is `TASK`, `RUNNING HANDLER` or `CLEANUP TASK`.
    fn task_start(&self, out: &mut dyn Write, task: &TaskInfo, banner: &str) -> io::Result<()> {
        let _ = (out, task, banner);
        Ok(())
    }

    fn runner_ok(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let _ = (out, result);
        Ok(())
    }

    fn runner_failed(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        ignore_errors: bool,
    ) -> io::Result<()> {
        let _ = (out, result, ignore_errors);
        Ok(())
    }

    fn runner_skipped(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let _ = (out, result);
        Ok(())
    }

    fn runner_unreachable(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let _ = (out, result);
        Ok(())
    }

    /// Loop item outcome; `status` is `ok`, `failed` or `skipping`.
    fn runner_item(
        &self,
        out: &mut dyn Write,
        result: &RunnerResult,
        status: &str,
    ) -> io::Result<()> {
        let _ = (out, result, status);
        Ok(())
    }

    fn runner_retry(&self, out: &mut dyn Write, result: &RunnerResult) -> io::Result<()> {
        let _ = (out, result);
        Ok(())
    }

    fn file_diff(&self, out: &mut dyn Write, host: &HostInfo, diff: &JsonValue) -> io::Result<()> {
        let _ = (out, host, diff);
        Ok(())
    }

    fn include(&self, out: &mut dyn Write, included: &IncludedFile) -> io::Result<()> {
        let _ = (out, included);
        Ok(())
    }

    fn no_hosts_matched(&self, out: &mut dyn Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }

    fn no_hosts_remaining(&self, out: &mut dyn Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }

    fn stats(&self, out: &mut dyn Write, stats: &PlaybookStats) -> io::Result<()> {
        let _ = (out, stats);
        Ok(())
    }
}
