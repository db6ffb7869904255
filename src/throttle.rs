//! Per-(action, path) suppression of duplicate work.
//!
//! Platform watchers deliver bursts of notifications for a single logical
//! change. The throttler collapses them: the first call within a window wins
//! a token, later calls are recorded as hits so the token holder can decide
//! to re-run once after finishing.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Work classes that share a suppression window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleAction {
    Add,
    AddDir,
    Readdir,
    Watch,
    Remove,
}

#[derive(Debug)]
struct Entry {
    expires_at: Instant,
    /// Zero-window entries only expire at the loop-turn sweep, so duplicate
    /// calls within one burst stay suppressed.
    sweep_only: bool,
    hits: u32,
}

/// Token returned to the winning caller; pass it back to [`Throttler::clear`]
/// to learn whether suppressed work arrived while the window was open.
#[derive(Debug)]
pub struct ThrottleToken {
    action: ThrottleAction,
    key: PathBuf,
}

/// Tracks active suppression windows.
#[derive(Debug, Default)]
pub struct Throttler {
    active: HashMap<(ThrottleAction, PathBuf), Entry>,
}

impl Throttler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the window for `(action, key)`.
    ///
    /// Returns a token when no window is active; returns `None` and records a
    /// hit when one is.
    pub fn throttle(
        &mut self,
        action: ThrottleAction,
        key: &Path,
        window: Duration,
    ) -> Option<ThrottleToken> {
        let now = Instant::now();
        match self.active.entry((action, key.to_path_buf())) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.sweep_only && entry.expires_at <= now {
                    *entry = Entry {
                        expires_at: now + window,
                        sweep_only: window.is_zero(),
                        hits: 0,
                    };
                    Some(ThrottleToken {
                        action,
                        key: key.to_path_buf(),
                    })
                } else {
                    entry.hits += 1;
                    None
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    expires_at: now + window,
                    sweep_only: window.is_zero(),
                    hits: 0,
                });
                Some(ThrottleToken {
                    action,
                    key: key.to_path_buf(),
                })
            }
        }
    }

    /// Close the window early.
    ///
    /// Returns `true` when at least one call was suppressed while it was
    /// open, signalling the caller to run once more.
    pub fn clear(&mut self, token: ThrottleToken) -> bool {
        self.active
            .remove(&(token.action, token.key))
            .map(|entry| entry.hits > 0)
            .unwrap_or(false)
    }

    /// Drop expired windows. Called once per engine loop turn.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        self.active.retain(|_, entry| entry.expires_at > now);
    }

    #[allow(dead_code)]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn first_caller_wins_the_window() {
        let mut throttler = Throttler::new();
        let path = Path::new("/test/dir");

        let token = throttler.throttle(ThrottleAction::Readdir, path, Duration::from_millis(100));
        assert!(token.is_some());

        // Second caller inside the window is suppressed.
        assert!(
            throttler
                .throttle(ThrottleAction::Readdir, path, Duration::from_millis(100))
                .is_none()
        );

        // The token holder learns about the suppressed call.
        assert!(throttler.clear(token.unwrap()));
    }

    #[test]
    fn clear_without_hits_reports_false() {
        let mut throttler = Throttler::new();
        let token = throttler
            .throttle(
                ThrottleAction::Readdir,
                Path::new("/a"),
                Duration::from_millis(100),
            )
            .unwrap();
        assert!(!throttler.clear(token));
    }

    #[test]
    fn expired_window_is_reclaimed() {
        let mut throttler = Throttler::new();
        let path = Path::new("/test/file");

        let token = throttler.throttle(ThrottleAction::Watch, path, Duration::from_millis(5));
        assert!(token.is_some());

        sleep(Duration::from_millis(10));

        // Window elapsed, a new caller may claim it without a sweep.
        assert!(
            throttler
                .throttle(ThrottleAction::Watch, path, Duration::from_millis(5))
                .is_some()
        );
    }

    #[test]
    fn zero_window_suppresses_until_sweep() {
        let mut throttler = Throttler::new();
        let path = Path::new("/test/file");

        assert!(
            throttler
                .throttle(ThrottleAction::Add, path, Duration::ZERO)
                .is_some()
        );
        sleep(Duration::from_millis(2));
        // Still suppressed despite the elapsed time.
        assert!(
            throttler
                .throttle(ThrottleAction::Add, path, Duration::ZERO)
                .is_none()
        );

        throttler.sweep();
        assert!(
            throttler
                .throttle(ThrottleAction::Add, path, Duration::ZERO)
                .is_some()
        );
    }

    #[test]
    fn actions_do_not_interfere() {
        let mut throttler = Throttler::new();
        let path = Path::new("/test/file");

        assert!(
            throttler
                .throttle(ThrottleAction::Add, path, Duration::ZERO)
                .is_some()
        );
        assert!(
            throttler
                .throttle(ThrottleAction::Watch, path, Duration::from_millis(5))
                .is_some()
        );
    }
}
