//! Directory subscriptions: scan, diff against the tracked children, and
//! recurse depth-limited.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::{FileStats, WatchEvent};
use crate::registry::{DirSubscription, Subscriber, WatchCloser};
use crate::scan::{self, ScanEntry};
use crate::throttle::ThrottleAction;

/// Window collapsing rescans of one directory.
const READDIR_WINDOW: Duration = Duration::from_millis(1000);

impl super::Engine {
    /// Subscribe to a directory: report it, scan it, and watch it for
    /// changes unless the depth limit says otherwise.
    ///
    /// With `target` set, this directory is watched on behalf of one child
    /// (a symlink leaf): the initial scan is skipped and rescans only
    /// descend into that child.
    pub(crate) async fn watch_dir(
        &mut self,
        dir: &Path,
        stats: FileStats,
        initial_add: bool,
        depth: u32,
        target: Option<OsString>,
    ) -> Option<WatchCloser> {
        let tracked = dir
            .parent()
            .zip(dir.file_name())
            .map_or(false, |(parent, name)| {
                self.watched.get(parent).is_some_and(|d| d.has(name))
            });

        if !(initial_add && self.cfg.watch.ignore_initial)
            && target.is_none()
            && !tracked
            && !self.is_ignored(dir)
        {
            crate::debug_event!("engine", "addDir", "{}", dir.display());
            self.emit(WatchEvent::AddDir {
                path: dir.to_path_buf(),
                stats,
            });
        }

        if let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) {
            self.watched.entry(parent).add(name);
        }
        self.watched.entry(dir);

        let within_depth = self.cfg.watch.depth.map_or(true, |limit| depth <= limit);
        if !within_depth || self.symlinks.contains(dir) {
            return None;
        }

        if target.is_none() {
            self.read_dir(dir.to_path_buf(), initial_add, depth, None).await;
            if self.closed {
                return None;
            }
        }

        let subscriber = Subscriber::Dir(DirSubscription {
            dir: dir.to_path_buf(),
            depth,
            target,
        });
        self.watch_with_backend(dir, subscriber, stats)
    }

    /// React to a notification for a watched directory.
    pub(crate) async fn on_dir_event(&mut self, sub: DirSubscription, stats: Option<FileStats>) {
        // mtime 0 is the deletion transient; rename compensation owns it.
        if stats.is_some_and(|s| s.mtime_ms == 0) {
            return;
        }
        self.read_dir(sub.dir, false, sub.depth, sub.target).await;
    }

    /// Rescan `dir` and reconcile with the remembered child set.
    ///
    /// New entries recurse through the add dispatcher; vanished entries are
    /// propagated as removals. A rescan suppressed while this one ran forces
    /// a single re-run to catch the race.
    pub(crate) async fn read_dir(
        &mut self,
        dir: PathBuf,
        initial_add: bool,
        depth: u32,
        target: Option<OsString>,
    ) {
        let Some(token) = self
            .throttler
            .throttle(ThrottleAction::Readdir, &dir, READDIR_WINDOW)
        else {
            return;
        };

        let previous: Vec<OsString> = self
            .watched
            .get(&dir)
            .map(|d| d.children().cloned().collect())
            .unwrap_or_default();
        let mut current: Vec<OsString> = Vec::new();

        let entries = match scan::read_dir_level(&dir, self.cfg.watch.follow_symlinks).await {
            Ok(entries) => entries,
            Err(error) => {
                self.throttler.clear(token);
                self.handle_error(error);
                return;
            }
        };

        for entry in entries {
            if self.closed {
                break;
            }
            if self.is_ignored(&entry.path) {
                continue;
            }
            current.push(entry.name.clone());

            if entry.is_symlink && self.handle_symlink(&entry, &dir).await {
                continue;
            }

            let recurse = match &target {
                Some(name) => entry.name == *name,
                None => !previous.contains(&entry.name),
            };
            if recurse {
                self.incr_ready();
                self.add_path(entry.path.clone(), initial_add, depth + 1, None).await;
            }
        }

        let was_throttled = self.throttler.clear(token);

        for name in previous {
            if current.contains(&name) {
                continue;
            }
            let gone = dir.join(&name);
            if !self.is_ignored(&gone) {
                self.remove_entry(dir.clone(), name, None).await;
            }
        }

        if was_throttled {
            Box::pin(self.read_dir(dir, false, depth, target)).await;
        }
    }

    /// Handle a symlink entry during a scan.
    ///
    /// Returns `true` when the entry was fully handled and the scan must not
    /// descend into it; `false` hands it back to the caller to recurse.
    pub(crate) async fn handle_symlink(&mut self, entry: &ScanEntry, directory: &Path) -> bool {
        if self.closed {
            return true;
        }
        let path = entry.path.clone();

        if !self.cfg.watch.follow_symlinks {
            // Leaf mode: the link itself is the watched entity. Retargeting
            // surfaces as a change.
            self.incr_ready();
            let link = match tokio::fs::canonicalize(&path).await {
                Ok(link) => link,
                Err(_) => {
                    self.ready_tick();
                    return true;
                }
            };
            let known = self
                .watched
                .get(directory)
                .is_some_and(|d| d.has(&entry.name));
            if known {
                let retargeted = self.symlinks.resolved(&path) != Some(link.as_path());
                if retargeted {
                    self.symlinks.record_resolved(path.clone(), link);
                    self.emit(WatchEvent::Change {
                        path,
                        stats: entry.stats,
                    });
                }
            } else {
                self.watched.entry(directory).add(entry.name.clone());
                self.symlinks.record_resolved(path.clone(), link);
                self.emit(WatchEvent::Add {
                    path,
                    stats: entry.stats,
                });
            }
            self.ready_tick();
            return true;
        }

        // Follow mode: enter each resolved target at most once, breaking
        // cycles like `a -> b -> a`.
        let resolved = match tokio::fs::canonicalize(&path).await {
            Ok(resolved) => resolved,
            Err(_) => return true,
        };
        if self.symlinks.contains(&resolved) {
            return true;
        }
        self.symlinks.mark_visited(resolved);
        false
    }
}
