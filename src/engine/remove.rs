//! Deletion propagation.

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::events::WatchEvent;
use crate::throttle::ThrottleAction;

/// Window deduplicating removal work for one path. Rescan diffing and
/// rename compensation can both observe the same disappearance.
const REMOVE_WINDOW: Duration = Duration::from_millis(100);

impl super::Engine {
    /// Propagate the disappearance of `item` under `directory`.
    ///
    /// Tracked children are removed first so nested unlinks precede the
    /// directory's own event. Boxed because it recurses.
    pub(crate) fn remove_entry(
        &mut self,
        directory: PathBuf,
        item: OsString,
        is_dir_hint: Option<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let path = directory.join(&item);
            let is_dir = is_dir_hint.unwrap_or_else(|| self.watched.contains(&path));

            if self
                .throttler
                .throttle(ThrottleAction::Remove, &path, REMOVE_WINDOW)
                .is_none()
            {
                return;
            }

            let nested: Vec<OsString> = self
                .watched
                .get(&path)
                .map(|dir| dir.children().cloned().collect())
                .unwrap_or_default();
            for name in nested {
                self.remove_entry(path.clone(), name, None).await;
            }

            let was_tracked = self
                .watched
                .get_mut(&directory)
                .map(|dir| dir.remove(&item))
                .unwrap_or(false);
            self.watched.remove_dir(&path);

            if was_tracked && !self.is_ignored(&path) {
                if is_dir {
                    crate::log_event!("engine", "unlinkDir", "{}", path.display());
                    self.emit(WatchEvent::UnlinkDir { path: path.clone() });
                } else {
                    crate::log_event!("engine", "unlink", "{}", path.display());
                    self.emit(WatchEvent::Unlink { path: path.clone() });
                }
            }

            self.close_path(&path);
        })
    }
}
