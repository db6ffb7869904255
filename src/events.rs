//! Watch event types and the outbound broadcast surface.
//!
//! Every observable change flows through [`EventBroadcaster`], a thin wrapper
//! over a tokio broadcast channel shared between the engine task and any
//! number of subscribers.

use std::fmt;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use tokio::sync::broadcast;

use crate::backend::RawKind;

/// Snapshot of the stat fields the engine cares about.
///
/// `mtime_ms == 0` is the disappearance transient: the platform reports it
/// for a path that vanished between the notification and the stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStats {
    pub size: u64,
    pub mtime_ms: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl FileStats {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            size: meta.len(),
            mtime_ms,
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
        }
    }

    /// Zeroed snapshot standing in for a path that does not exist.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_missing(&self) -> bool {
        self.mtime_ms == 0
    }
}

/// Normalized events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file appeared under a watched root.
    Add { path: PathBuf, stats: FileStats },
    /// A directory appeared under a watched root.
    AddDir { path: PathBuf, stats: FileStats },
    /// A watched file's contents or metadata changed.
    Change { path: PathBuf, stats: FileStats },
    /// A watched file disappeared.
    Unlink { path: PathBuf },
    /// A watched directory disappeared.
    UnlinkDir { path: PathBuf },
    /// All initially supplied paths have been classified and scanned.
    Ready,
    /// A non-recoverable problem was observed; the watch itself persists.
    Error { message: String },
    /// Verbatim passthrough of the underlying platform notification.
    Raw {
        kind: RawKind,
        path: PathBuf,
        watched_path: PathBuf,
    },
}

impl WatchEvent {
    /// The path the event refers to, when it has one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Add { path, .. }
            | Self::AddDir { path, .. }
            | Self::Change { path, .. }
            | Self::Unlink { path }
            | Self::UnlinkDir { path }
            | Self::Raw { path, .. } => Some(path),
            Self::Ready | Self::Error { .. } => None,
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { path, .. } => write!(f, "add {}", path.display()),
            Self::AddDir { path, .. } => write!(f, "addDir {}", path.display()),
            Self::Change { path, .. } => write!(f, "change {}", path.display()),
            Self::Unlink { path } => write!(f, "unlink {}", path.display()),
            Self::UnlinkDir { path } => write!(f, "unlinkDir {}", path.display()),
            Self::Ready => write!(f, "ready"),
            Self::Error { message } => write!(f, "error {message}"),
            Self::Raw {
                kind,
                path,
                watched_path,
            } => write!(
                f,
                "raw {kind:?} {} (watched {})",
                path.display(),
                watched_path.display()
            ),
        }
    }
}

/// Fans watch events out to every active subscriber.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WatchEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    pub fn send(&self, event: WatchEvent) {
        match self.sender.send(event) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "to {count} subscribers");
            }
            Err(_) => {
                // No receivers, this is fine
                crate::debug_event!("broadcast", "dropped", "no subscribers");
            }
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stats_are_the_transient() {
        assert!(FileStats::missing().is_missing());
        let live = FileStats {
            size: 4,
            mtime_ms: 1,
            is_dir: false,
            is_symlink: false,
        };
        assert!(!live.is_missing());
    }

    #[test]
    fn display_formats_event_names() {
        let event = WatchEvent::Add {
            path: PathBuf::from("/tmp/a"),
            stats: FileStats::default(),
        };
        assert_eq!(event.to_string(), "add /tmp/a");
        assert_eq!(WatchEvent::Ready.to_string(), "ready");
    }

    #[tokio::test]
    async fn broadcaster_delivers_to_subscribers() {
        let bus = EventBroadcaster::new(16);
        let mut rx = bus.subscribe();
        bus.send(WatchEvent::Ready);
        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Ready);
    }
}
