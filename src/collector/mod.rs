//! Everything that produces activity instants.
//!
//! History comes from a [vcs::VcsSource] and from pulses the daemon recorded on disk, and is
//! merged by [retention::collect]. Live activity goes through [listeners] into the shared
//! [buffer::ActivityBuffer], which [pruning] keeps limited to the current day.

pub mod buffer;
pub mod event;
pub mod file_watch;
pub mod listeners;
pub mod pruning;
pub mod retention;
pub mod vcs;

pub use event::{ActivityEvent, ActivityKind};
