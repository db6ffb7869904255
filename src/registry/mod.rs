//! Watch registries.
//!
//! A registry multiplexes many logical subscribers onto one watch per
//! absolute path. The native registry fronts event-driven platform handles;
//! the polling registry schedules stat samples. Both hand out slot-indexed
//! closers with reference-counted teardown.

use std::ffi::OsString;
use std::path::PathBuf;

mod native;
mod polling;

pub use native::{NativeWatchEntry, NativeWatchRegistry};
pub use polling::{PollOptions, PollingWatchEntry, PollingWatchRegistry};

/// A logical watcher occupying one registry slot.
///
/// Registries store these as data; the engine owns all mutable state and
/// interprets a subscriber when a notification arrives for its entry.
#[derive(Debug, Clone)]
pub enum Subscriber {
    File(FileSubscription),
    Dir(DirSubscription),
}

/// Single-file subscription.
#[derive(Debug, Clone)]
pub struct FileSubscription {
    /// Absolute path of the watched file.
    pub path: PathBuf,
}

/// Directory subscription; carries what a rescan needs.
#[derive(Debug, Clone)]
pub struct DirSubscription {
    /// Absolute path of the watched directory.
    pub dir: PathBuf,
    /// Recursion depth this directory sits at.
    pub depth: u32,
    /// When set, rescans only descend into this one child.
    pub target: Option<OsString>,
}

/// Undoes one subscription. Idempotent: releasing a cleared slot is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCloser {
    Native { path: PathBuf, slot: usize },
    NativeUnshared { index: usize },
    Polling { path: PathBuf, slot: usize },
}
