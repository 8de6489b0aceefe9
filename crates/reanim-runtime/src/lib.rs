//! REANIM Runtime - the replacer engine
//!
//! [`ReplacerEngine`] ties the pieces together for a host:
//! - rule pack loading and unloading, with stable motion and synchronized index blocks
//! - per-slot candidate lists and on-demand selection with evaluation traces
//! - playback callbacks forwarded to the tracker
//! - deferred edits applied between frames
//! - the detected-problems sweep
//!
//! [`init_logging`] installs a `tracing` subscriber driven by [`LogConfig`].

pub mod config;
pub mod edits;
pub mod engine;
pub mod loader;
pub mod telemetry;

pub use config::*;
pub use edits::*;
pub use engine::*;
pub use telemetry::*;
