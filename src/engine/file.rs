//! Single-file subscriptions.

use std::path::Path;
use std::time::Duration;

use crate::events::{FileStats, WatchEvent};
use crate::registry::{FileSubscription, Subscriber, WatchCloser};
use crate::throttle::ThrottleAction;

/// Window collapsing duplicate notifications for one file change.
const WATCH_WINDOW: Duration = Duration::from_millis(5);

impl super::Engine {
    /// Subscribe to a single file and emit its initial `add`.
    pub(crate) fn watch_file(
        &mut self,
        path: &Path,
        stats: FileStats,
        initial_add: bool,
    ) -> Option<WatchCloser> {
        let subscriber = Subscriber::File(FileSubscription {
            path: path.to_path_buf(),
        });
        let closer = self.watch_with_backend(path, subscriber, stats)?;

        if !(initial_add && self.cfg.watch.ignore_initial)
            && self
                .throttler
                .throttle(ThrottleAction::Add, path, Duration::ZERO)
                .is_some()
        {
            self.emit(WatchEvent::Add {
                path: path.to_path_buf(),
                stats,
            });
        }
        Some(closer)
    }

    /// React to a notification for a watched file.
    ///
    /// Native notifications carry no stats; polling carries the sampled
    /// snapshot. Either way, a missing or zeroed snapshot forces a restat
    /// that decides between `change` and `unlink`.
    pub(crate) async fn on_file_event(&mut self, path: &Path, new_stats: Option<FileStats>) {
        if self.closed {
            return;
        }
        if self
            .throttler
            .throttle(ThrottleAction::Watch, path, WATCH_WINDOW)
            .is_none()
        {
            return;
        }

        let tracked = path
            .parent()
            .zip(path.file_name())
            .map_or(false, |(parent, name)| {
                self.watched.get(parent).is_some_and(|dir| dir.has(name))
            });

        match new_stats {
            Some(stats) if stats.mtime_ms != 0 => {
                if tracked {
                    self.emit(WatchEvent::Change {
                        path: path.to_path_buf(),
                        stats,
                    });
                }
            }
            _ => match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    if tracked {
                        self.emit(WatchEvent::Change {
                            path: path.to_path_buf(),
                            stats: FileStats::from_metadata(&meta),
                        });
                    }
                }
                Err(_) => {
                    // Vanished: recover the transient into an unlink.
                    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
                        let parent = parent.to_path_buf();
                        let name = name.to_os_string();
                        self.remove_entry(parent, name, None).await;
                    }
                }
            },
        }
    }
}
