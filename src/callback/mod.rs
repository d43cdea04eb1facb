//! Playbook Event Capture
//!
//! This module turns lifecycle hooks into framed event records for a job
//! dashboard reading the same stream as the human-readable output.
//!
//! # Architecture
//!
//! 1. **[`EventContext`]**: global attributes (playbook, play, task) plus a
//!    local layer per execution context for the event being captured
//! 2. **[`censor_result`]**: redacts no-log results before they are written
//! 3. **[`EventEmitter`]**: opens an [`EventScope`] per event, writing the
//!    begin record on entry and restoring the local layer on exit
//! 4. **[`EventDispatcher`]**: implements every
//!    [`PlaybookCallback`](crate::traits::PlaybookCallback) hook and keeps the
//!    global layer in step with the run
//! 5. **[`wire`]**: frame encoding ([`EventWriter`]) and decoding
//!    ([`EventStreamReader`])
//!
//! # Example
//!
//! ```rust,ignore
//! use rustible_events::callback::prelude::*;
//!
//! let dispatcher = EventDispatcher::new(EventWriter::stdout());
//! dispatcher.playbook_on_start(&PlaybookInfo::new("site.yml"))?;
//! dispatcher.playbook_on_play_start(&PlayInfo::new("web").with_hosts(["web1"]))?;
//! ```

pub mod censor;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod emitter;
pub mod plugins;
pub mod record;
pub mod types;
pub mod wire;

pub use censor::{censor_result, CENSORED};
pub use config::{EventsConfig, EventsConfigLoader, JobIds, OutputStyle};
pub use context::{EventContext, LocalFrame};
pub use dispatcher::EventDispatcher;
pub use emitter::{EventData, EventEmitter, EventScope};
pub use plugins::{DefaultDisplay, MinimalDisplay};
pub use record::{EventRecord, RecordOptions};
pub use types::{
    Attributes, EventName, HandlerInfo, HostInfo, HostPattern, IncludedFile, PlayInfo,
    PlaybookInfo, PlaybookStats, RunnerResult, TaskInfo, VarsPrompt,
};
pub use wire::{EventStreamReader, EventWriter, StreamItem};

/// A dispatcher shared between orchestrator threads.
pub type SharedDispatcher = std::sync::Arc<EventDispatcher>;

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for wiring event capture into an orchestrator.
pub mod prelude {
    pub use super::{
        censor_result, EventContext, EventData, EventDispatcher, EventEmitter, EventName,
        EventWriter, EventsConfig, EventsConfigLoader, HostInfo, PlayInfo, PlaybookInfo,
        PlaybookStats, RunnerResult, SharedDispatcher, TaskInfo,
    };
    pub use crate::traits::{DisplayCallback, PlaybookCallback};
}
