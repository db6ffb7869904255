//! Registry of event-driven platform watches.
//!
//! One entry per absolute path, created on the first subscriber, torn down
//! when the last slot clears. Entries flagged `unusable` keep their handle
//! open forever: the platform reported a fatal error on it, and closing such
//! a handle can take the host down with it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{Subscriber, WatchCloser};
use crate::backend::{EventBackend, NativeHandle};
use crate::error::WatchError;

/// Shared state behind one watched path.
pub struct NativeWatchEntry {
    slots: Vec<Option<Subscriber>>,
    handle: Option<Box<dyn NativeHandle>>,
    /// Set when the handle reported a fatal error. Inhibits close.
    pub unusable: bool,
    /// Whether the path was a directory when first subscribed; consulted by
    /// rename compensation after the path vanishes.
    pub was_dir: bool,
}

impl NativeWatchEntry {
    fn attach(&mut self, subscriber: Subscriber) -> usize {
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(subscriber);
            free
        } else {
            self.slots.push(Some(subscriber));
            self.slots.len() - 1
        }
    }

    fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

struct UnsharedWatch {
    path: PathBuf,
    subscriber: Subscriber,
    handle: Box<dyn NativeHandle>,
}

/// Table of event-driven watches keyed by absolute path.
#[derive(Default)]
pub struct NativeWatchRegistry {
    entries: HashMap<PathBuf, NativeWatchEntry>,
    /// Non-persistent subscriptions each own a private handle and never
    /// share an entry.
    unshared: Vec<Option<UnsharedWatch>>,
}

impl NativeWatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber to `abs`, opening a handle on first use.
    pub fn subscribe(
        &mut self,
        backend: &mut dyn EventBackend,
        abs: &Path,
        persistent: bool,
        subscriber: Subscriber,
    ) -> Result<WatchCloser, WatchError> {
        let is_dir = matches!(subscriber, Subscriber::Dir(_));

        if !persistent {
            let handle = backend.open(abs)?;
            let watch = UnsharedWatch {
                path: abs.to_path_buf(),
                subscriber,
                handle,
            };
            let index = if let Some(free) = self.unshared.iter().position(Option::is_none) {
                self.unshared[free] = Some(watch);
                free
            } else {
                self.unshared.push(Some(watch));
                self.unshared.len() - 1
            };
            return Ok(WatchCloser::NativeUnshared { index });
        }

        if let Some(entry) = self.entries.get_mut(abs) {
            entry.was_dir |= is_dir;
            let slot = entry.attach(subscriber);
            return Ok(WatchCloser::Native {
                path: abs.to_path_buf(),
                slot,
            });
        }

        let handle = backend.open(abs)?;
        let mut entry = NativeWatchEntry {
            slots: Vec::new(),
            handle: Some(handle),
            unusable: false,
            was_dir: is_dir,
        };
        let slot = entry.attach(subscriber);
        self.entries.insert(abs.to_path_buf(), entry);
        Ok(WatchCloser::Native {
            path: abs.to_path_buf(),
            slot,
        })
    }

    /// Live subscribers for `abs`, or `None` when nothing watches it.
    pub fn subscribers(&self, abs: &Path) -> Option<Vec<Subscriber>> {
        let mut found = false;
        let mut result = Vec::new();
        if let Some(entry) = self.entries.get(abs) {
            found = true;
            result.extend(entry.slots.iter().flatten().cloned());
        }
        for watch in self.unshared.iter().flatten() {
            if watch.path == abs {
                found = true;
                result.push(watch.subscriber.clone());
            }
        }
        found.then_some(result)
    }

    pub fn contains(&self, abs: &Path) -> bool {
        self.entries.contains_key(abs)
            || self
                .unshared
                .iter()
                .flatten()
                .any(|watch| watch.path == abs)
    }

    /// Every watched path, shared and unshared.
    pub fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self.entries.keys().cloned().collect();
        keys.extend(self.unshared.iter().flatten().map(|w| w.path.clone()));
        keys
    }

    pub fn was_dir(&self, abs: &Path) -> bool {
        self.entries.get(abs).map(|e| e.was_dir).unwrap_or_else(|| {
            self.unshared
                .iter()
                .flatten()
                .any(|w| w.path == abs && matches!(w.subscriber, Subscriber::Dir(_)))
        })
    }

    /// Flag the entry so teardown leaves its handle open.
    pub fn mark_unusable(&mut self, abs: &Path) {
        if let Some(entry) = self.entries.get_mut(abs) {
            entry.unusable = true;
        }
    }

    /// Release one subscription. Returns `true` when a live slot was
    /// cleared. Clearing the last slot closes the handle unless the entry is
    /// unusable, in which case the handle is deliberately leaked.
    pub fn release(&mut self, closer: &WatchCloser) -> bool {
        match closer {
            WatchCloser::Native { path, slot } => {
                let Some(entry) = self.entries.get_mut(path) else {
                    return false;
                };
                match entry.slots.get_mut(*slot) {
                    Some(slot_ref) if slot_ref.is_some() => *slot_ref = None,
                    _ => return false,
                }
                if entry.live_count() == 0 {
                    if let Some(mut entry) = self.entries.remove(path) {
                        if !entry.unusable {
                            if let Some(mut handle) = entry.handle.take() {
                                handle.close();
                            }
                        }
                    }
                }
                true
            }
            WatchCloser::NativeUnshared { index } => {
                let Some(watch) = self.unshared.get_mut(*index).and_then(Option::take) else {
                    return false;
                };
                let mut handle = watch.handle;
                handle.close();
                true
            }
            WatchCloser::Polling { .. } => false,
        }
    }

    /// Tear everything down, honoring the unusable flag.
    pub fn close_all(&mut self) {
        for (_, mut entry) in self.entries.drain() {
            if !entry.unusable {
                if let Some(mut handle) = entry.handle.take() {
                    handle.close();
                }
            }
        }
        for watch in self.unshared.drain(..).flatten() {
            let mut handle = watch.handle;
            handle.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.unshared.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
