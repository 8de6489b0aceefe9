//! REANIM Playback - Live playback handles and their engine state
//!
//! The host reports playback callbacks for a handle; the tracker answers with
//! the motion that should drive it:
//!
//! ```text
//! activate ──► update / generate ──► loop / echo ──► deactivate
//!    │               │                    │               │
//!  select        crossfade            reselect      restore sync
//! ```

pub mod frame;
pub mod host;
pub mod instance;
pub mod pose;
pub mod sync;
pub mod tracker;

pub use frame::*;
pub use host::*;
pub use instance::*;
pub use pose::*;
pub use sync::*;
pub use tracker::*;
