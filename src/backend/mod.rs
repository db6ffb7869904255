//! OS-primitive abstraction layer.
//!
//! The engine consumes two primitives: an event-driven watcher delivering
//! rename/change notifications per watched path, and a stat-polling sampler.
//! Both are modelled here so the engine can run against the real platform
//! (`notify`) or a deterministic in-memory double (`mock`).

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::WatchError;

mod mock;
mod notify;
mod poll;

pub use mock::{MockBackend, MockController};
pub use notify::NotifyBackend;
pub use poll::stat_snapshot;

/// The two raw notification kinds platforms agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// An entry appeared, disappeared, or changed its name.
    Rename,
    /// An entry's contents or metadata changed in place.
    Change,
}

/// A raw notification attributed to one watched path.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawKind,
    /// Basename of the affected child, relative to the watched path. Empty
    /// when the platform reports the watched path itself.
    pub entry: Option<OsString>,
}

/// What a backend delivers into the engine's event channel.
#[derive(Debug)]
pub enum BackendMessage {
    Event { watched: PathBuf, event: RawEvent },
    Error { watched: PathBuf, error: io::Error },
}

/// An open event-driven watch. Closing is idempotent.
pub trait NativeHandle: Send {
    fn close(&mut self);
}

/// Factory for event-driven watches.
///
/// Implementations deliver [`BackendMessage`]s on the sender they were
/// constructed with; `open` only registers interest in a path.
pub trait EventBackend: Send {
    fn open(&mut self, path: &Path) -> Result<Box<dyn NativeHandle>, WatchError>;
}
