//! Production event backend over the `notify` crate.
//!
//! One `RecommendedWatcher` serves every open path. Platform events carry
//! full paths, so the dispatch closure maps each one back to the nearest
//! registered root and reduces the event kind to rename/change.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::{BackendMessage, EventBackend, NativeHandle, RawEvent, RawKind};
use crate::error::WatchError;

/// Event-driven backend wrapping `notify::RecommendedWatcher`.
pub struct NotifyBackend {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    roots: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl NotifyBackend {
    pub fn new(tx: mpsc::UnboundedSender<BackendMessage>) -> Result<Self, WatchError> {
        let roots: Arc<Mutex<BTreeSet<PathBuf>>> = Arc::default();
        let dispatch_roots = Arc::clone(&roots);

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let Some(kind) = translate_kind(&event.kind) else {
                        return;
                    };
                    for path in &event.paths {
                        let Some(root) = nearest_root(&dispatch_roots, path) else {
                            continue;
                        };
                        let entry = path
                            .strip_prefix(&root)
                            .ok()
                            .and_then(|rest| rest.iter().next())
                            .map(|name| name.to_os_string());
                        let _ = tx.send(BackendMessage::Event {
                            watched: root,
                            event: RawEvent { kind, entry },
                        });
                    }
                }
                Err(error) => {
                    let io_kind = match &error.kind {
                        notify::ErrorKind::Io(e) => e.kind(),
                        _ => io::ErrorKind::Other,
                    };
                    for path in &error.paths {
                        if let Some(root) = nearest_root(&dispatch_roots, path) {
                            let _ = tx.send(BackendMessage::Error {
                                watched: root,
                                error: io::Error::new(io_kind, error.to_string()),
                            });
                        }
                    }
                }
            }
        })?;

        Ok(Self {
            watcher: Arc::new(Mutex::new(watcher)),
            roots,
        })
    }
}

impl EventBackend for NotifyBackend {
    fn open(&mut self, path: &Path) -> Result<Box<dyn NativeHandle>, WatchError> {
        if let Ok(mut watcher) = self.watcher.lock() {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }
        if let Ok(mut roots) = self.roots.lock() {
            roots.insert(path.to_path_buf());
        }
        crate::debug_event!("backend", "watching", "{}", path.display());
        Ok(Box::new(NotifyHandle {
            path: path.to_path_buf(),
            watcher: Arc::clone(&self.watcher),
            roots: Arc::clone(&self.roots),
            closed: false,
        }))
    }
}

struct NotifyHandle {
    path: PathBuf,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    roots: Arc<Mutex<BTreeSet<PathBuf>>>,
    closed: bool,
}

impl NativeHandle for NotifyHandle {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut roots) = self.roots.lock() {
            roots.remove(&self.path);
        }
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Err(e) = watcher.unwatch(&self.path) {
                crate::debug_event!("backend", "unwatch failed", "{}: {e}", self.path.display());
            }
        }
    }
}

/// Reduce the platform event kind to the two-valued raw contract.
///
/// Create/remove and name modifications surface as renames everywhere;
/// in-place data or metadata writes surface as changes. Access events are
/// noise except close-after-write, which Linux delivers for completed saves.
fn translate_kind(kind: &EventKind) -> Option<RawKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(RawKind::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(RawKind::Rename),
        EventKind::Modify(_) => Some(RawKind::Change),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(RawKind::Change),
        _ => None,
    }
}

/// Longest registered root that is a prefix of `path`.
fn nearest_root(roots: &Mutex<BTreeSet<PathBuf>>, path: &Path) -> Option<PathBuf> {
    let roots = roots.lock().ok()?;
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.as_os_str().len())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    #[test]
    fn kinds_reduce_to_rename_or_change() {
        assert_eq!(
            translate_kind(&EventKind::Create(CreateKind::File)),
            Some(RawKind::Rename)
        );
        assert_eq!(
            translate_kind(&EventKind::Remove(RemoveKind::Folder)),
            Some(RawKind::Rename)
        );
        assert_eq!(
            translate_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(RawKind::Rename)
        );
        assert_eq!(
            translate_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(RawKind::Change)
        );
        assert_eq!(
            translate_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            Some(RawKind::Change)
        );
        assert_eq!(translate_kind(&EventKind::Access(AccessKind::Open(AccessMode::Any))), None);
    }

    #[test]
    fn nearest_root_prefers_the_deepest_prefix() {
        let roots = Mutex::new(BTreeSet::from([
            PathBuf::from("/a"),
            PathBuf::from("/a/b"),
        ]));
        assert_eq!(
            nearest_root(&roots, Path::new("/a/b/c.txt")),
            Some(PathBuf::from("/a/b"))
        );
        assert_eq!(
            nearest_root(&roots, Path::new("/a/x.txt")),
            Some(PathBuf::from("/a"))
        );
        assert_eq!(nearest_root(&roots, Path::new("/z")), None);
    }
}
