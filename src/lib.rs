//! # Rustible Events - Playbook Event Capture
//!
//! Rustible Events reports every lifecycle hook of a playbook run as a
//! structured, censored record on the run's output stream, where a job
//! dashboard reads them alongside the human-readable output.
//!
//! ## Core Concepts
//!
//! - **Event context**: playbook, play and task identity shared by every
//!   event, plus per-thread attributes of the event being captured
//! - **Event scope**: one begin record on entry, one end marker on exit, with
//!   the context restored even on early return or panic
//! - **Censoring**: results of no-log tasks are reduced to a short allow-list
//!   before they are serialized
//! - **Wire format**: records hidden inside terminal escape sequences, with
//!   explicit chunk lengths so the reader never scans for a delimiter
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Orchestrator (hooks)                      │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      EventDispatcher                         │
//! │      (global transitions, task dedup, output style)          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │  EventEmitter   │  │  EventContext   │  │  censor_result  │
//! │  (scope guard)  │  │ (global+local)  │  │   (redaction)   │
//! └─────────────────┘  └─────────────────┘  └─────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                EventWriter  ->  output stream                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rustible_events::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = EventsConfigLoader::new().load()?;
//!     let dispatcher = EventDispatcher::from_config(&config)?;
//!
//!     dispatcher.playbook_on_start(&PlaybookInfo::new("site.yml"))?;
//!     dispatcher.playbook_on_play_start(&PlayInfo::new("web").with_hosts(["web1"]))?;
//!     let task = TaskInfo::new("install nginx", "apt");
//!     dispatcher.playbook_on_task_start(&task, false)?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::callback::prelude::*;
    pub use crate::error::{Error, Result};
}

// ============================================================================
// Core Infrastructure
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Hook interfaces between the orchestrator, the dispatcher and output styles.
pub mod traits;

// ============================================================================
// Event Capture
// ============================================================================

/// Event context, censoring, emission, dispatch and the wire format.
pub mod callback;

// ============================================================================
// Command Line Interface
// ============================================================================

/// Consumer-side command line tools.
pub mod cli;

/// Returns the current version of Rustible Events.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
