//! Registry of stat-polling watches.
//!
//! Entries are sampled by the engine loop. When a joining subscriber asks
//! for stronger options than the entry currently has (persistence, or a
//! shorter interval), the entry is upgraded in place: the schedule restarts
//! under the stronger options and every attached slot is carried over.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{Subscriber, WatchCloser};
use crate::events::FileStats;

/// Options one polling entry runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub persistent: bool,
    pub interval: Duration,
}

/// Shared state behind one polled path.
#[derive(Debug)]
pub struct PollingWatchEntry {
    slots: Vec<Option<Subscriber>>,
    pub options: PollOptions,
    /// Previous sample; the comparison baseline.
    pub last: Option<FileStats>,
    pub next_due: Instant,
}

impl PollingWatchEntry {
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

/// Table of polled paths.
#[derive(Debug, Default)]
pub struct PollingWatchRegistry {
    entries: HashMap<PathBuf, PollingWatchEntry>,
}

impl PollingWatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber to `abs`, creating or upgrading the entry.
    ///
    /// `baseline` seeds the comparison state so a write landing between
    /// subscription and the first sample is still observed.
    pub fn subscribe(
        &mut self,
        abs: &Path,
        options: PollOptions,
        subscriber: Subscriber,
        baseline: FileStats,
    ) -> WatchCloser {
        let now = Instant::now();
        match self.entries.get_mut(abs) {
            Some(entry) => {
                let stronger = (options.persistent && !entry.options.persistent)
                    || options.interval < entry.options.interval;
                if stronger {
                    entry.options = PollOptions {
                        persistent: entry.options.persistent || options.persistent,
                        interval: entry.options.interval.min(options.interval),
                    };
                    // Reopen under the new options: schedule restarts now.
                    entry.next_due = now;
                    crate::debug_event!(
                        "polling",
                        "upgraded",
                        "{} to {:?}",
                        abs.display(),
                        entry.options.interval
                    );
                }
                let slot = entry.attach(subscriber);
                WatchCloser::Polling {
                    path: abs.to_path_buf(),
                    slot,
                }
            }
            None => {
                let mut entry = PollingWatchEntry {
                    slots: Vec::new(),
                    options,
                    last: Some(baseline),
                    next_due: now + options.interval,
                };
                let slot = entry.attach(subscriber);
                self.entries.insert(abs.to_path_buf(), entry);
                WatchCloser::Polling {
                    path: abs.to_path_buf(),
                    slot,
                }
            }
        }
    }

    /// Live subscribers for `abs`.
    pub fn subscribers(&self, abs: &Path) -> Vec<Subscriber> {
        self.entries
            .get(abs)
            .map(|entry| entry.slots.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Paths whose next sample is due.
    pub fn due_paths(&self, now: Instant) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.next_due <= now)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Record a sample and advance the schedule.
    ///
    /// Returns the previous snapshot when the sample differs from it, i.e.
    /// when the poll callback should fire.
    pub fn record_sample(&mut self, abs: &Path, current: FileStats, now: Instant) -> Option<FileStats> {
        let entry = self.entries.get_mut(abs)?;
        entry.next_due = now + entry.options.interval;
        let previous = entry.last.replace(current).unwrap_or_else(FileStats::missing);
        (previous != current).then_some(previous)
    }

    pub fn options(&self, abs: &Path) -> Option<PollOptions> {
        self.entries.get(abs).map(|entry| entry.options)
    }

    /// Release one subscription; the entry dies with its last slot.
    pub fn release(&mut self, closer: &WatchCloser) -> bool {
        let WatchCloser::Polling { path, slot } = closer else {
            return false;
        };
        let Some(entry) = self.entries.get_mut(path) else {
            return false;
        };
        match entry.slots.get_mut(*slot) {
            Some(slot_ref) if slot_ref.is_some() => *slot_ref = None,
            _ => return false,
        }
        if entry.live_count() == 0 {
            self.entries.remove(path);
        }
        true
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
