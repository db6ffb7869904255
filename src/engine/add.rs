//! Classify-and-route entry point for new paths.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::WatchError;
use crate::events::{FileStats, WatchEvent};
use crate::registry::WatchCloser;

impl super::Engine {
    /// Stat a path, classify it, and hand it to the right watcher.
    ///
    /// Boxed because directory scans recurse back into it.
    pub(crate) fn add_path(
        &mut self,
        path: PathBuf,
        initial_add: bool,
        depth: u32,
        target: Option<OsString>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.closed || self.is_ignored(&path) {
                self.ready_tick();
                return;
            }

            // Following links means classification sees the target; leaf
            // mode stats the link itself.
            let meta = if self.cfg.watch.follow_symlinks {
                tokio::fs::metadata(&path).await
            } else {
                tokio::fs::symlink_metadata(&path).await
            };
            let meta = match meta {
                Ok(meta) => meta,
                Err(source) => {
                    self.handle_error(WatchError::Stat { path, source });
                    self.ready_tick();
                    return;
                }
            };
            let stats = FileStats::from_metadata(&meta);

            let closer = if stats.is_dir {
                self.watch_dir(&path, stats, initial_add, depth, target).await
            } else if stats.is_symlink {
                self.add_symlink(&path, stats, initial_add, depth).await
            } else {
                self.watch_file(&path, stats, initial_add)
            };

            self.ready_tick();
            if let Some(closer) = closer {
                self.record_closer(&path, closer);
            }
        })
    }

    /// A leaf-mode symlink: report it, then watch the parent directory on
    /// its behalf so retargeting and removal are observed.
    async fn add_symlink(
        &mut self,
        path: &Path,
        stats: FileStats,
        initial_add: bool,
        depth: u32,
    ) -> Option<WatchCloser> {
        let parent = path.parent()?.to_path_buf();
        let name = path.file_name()?.to_os_string();

        self.watched.entry(&parent).add(name.clone());
        self.emit(WatchEvent::Add {
            path: path.to_path_buf(),
            stats,
        });

        let closer = self
            .watch_dir(&parent, stats, initial_add, depth, Some(name))
            .await;

        // Remember where the link points for later correlation.
        if let Ok(real) = tokio::fs::canonicalize(path).await {
            self.symlinks.record_resolved(path.to_path_buf(), real);
        }
        closer
    }
}
