//! Output styles composed with event capture.
//!
//! - [`DefaultDisplay`] - Ansible-like banners, per-host lines and a recap
//! - [`MinimalDisplay`] - Failures and unreachable hosts only
//!
//! # Example
//!
//! ```rust,ignore
//! use rustible_events::callback::plugins::MinimalDisplay;
//! use rustible_events::callback::{EventDispatcher, EventWriter};
//!
//! let dispatcher = EventDispatcher::new(EventWriter::stdout())
//!     .with_display(MinimalDisplay::new().with_colors(false));
//! ```

pub mod default;
pub mod minimal;

pub use default::DefaultDisplay;
pub use minimal::MinimalDisplay;
