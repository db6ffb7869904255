//! Engine state and the single-task event loop.
//!
//! All mutable watch state lives on one tokio task. The loop multiplexes
//! three sources: raw backend notifications, facade commands, and a timer
//! tick that drives polling samples and throttle expiry. Because nothing
//! else touches the registries, no locking is needed anywhere in the engine.

mod add;
mod dir;
mod file;
mod remove;

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::backend::{self, BackendMessage, EventBackend, RawEvent, RawKind};
use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::events::{EventBroadcaster, FileStats, WatchEvent};
use crate::filter::IgnoreFilter;
use crate::registry::{
    NativeWatchRegistry, PollOptions, PollingWatchRegistry, Subscriber, WatchCloser,
};
use crate::symlink::SymlinkMemory;
use crate::throttle::Throttler;
use crate::watched::WatchedDirs;

/// Loop tick driving polling samples and throttle sweeps.
const TICK: Duration = Duration::from_millis(25);

/// Requests from the facade.
pub(crate) enum Command {
    Add(Vec<PathBuf>),
    Unwatch(Vec<PathBuf>),
    Watched(oneshot::Sender<HashMap<PathBuf, Vec<OsString>>>),
    Close,
}

/// Immutable engine configuration.
pub(crate) struct EngineConfig {
    pub watch: WatchConfig,
    pub filter: IgnoreFilter,
}

pub(crate) struct Engine {
    cfg: EngineConfig,
    backend: Box<dyn EventBackend>,
    native: NativeWatchRegistry,
    polling: PollingWatchRegistry,
    watched: WatchedDirs,
    symlinks: SymlinkMemory,
    throttler: Throttler,
    /// Closers recorded per subscribed path, run on removal and shutdown.
    closers: HashMap<PathBuf, Vec<WatchCloser>>,
    bus: EventBroadcaster,
    ready_pending: usize,
    ready_emitted: bool,
    closed: bool,
}

impl Engine {
    pub(crate) fn new(
        cfg: EngineConfig,
        backend: Box<dyn EventBackend>,
        bus: EventBroadcaster,
    ) -> Self {
        Self {
            cfg,
            backend,
            native: NativeWatchRegistry::new(),
            polling: PollingWatchRegistry::new(),
            watched: WatchedDirs::new(),
            symlinks: SymlinkMemory::new(),
            throttler: Throttler::new(),
            closers: HashMap::new(),
            bus,
            ready_pending: 0,
            ready_emitted: false,
            closed: false,
        }
    }

    /// Drive the engine until `close()` arrives.
    pub(crate) async fn run(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<BackendMessage>,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        initial: Vec<PathBuf>,
    ) {
        self.ready_pending = initial.len();
        if initial.is_empty() {
            self.ready_emitted = true;
            self.emit(WatchEvent::Ready);
        }
        for path in initial {
            self.add_path(path, true, 0, None).await;
        }
        self.throttler.sweep();

        crate::log_event!("engine", "started");

        loop {
            let tick = tokio::time::sleep(TICK);
            tokio::pin!(tick);

            tokio::select! {
                Some(message) = raw_rx.recv() => {
                    self.on_backend_message(message).await;
                }
                command = cmd_rx.recv() => {
                    // A closed command channel means the facade is gone.
                    match command {
                        Some(command) => {
                            if self.on_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut tick => {
                    self.poll_due().await;
                }
            }

            self.throttler.sweep();
            if self.closed {
                break;
            }
        }

        self.shutdown();
        crate::log_event!("engine", "stopped");
    }

    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Add(paths) => {
                for path in paths {
                    let abs = absolutize(&path);
                    self.incr_ready();
                    self.add_path(abs, true, 0, None).await;
                }
                false
            }
            Command::Unwatch(paths) => {
                self.unwatch_paths(paths);
                false
            }
            Command::Watched(reply) => {
                let _ = reply.send(self.watched.snapshot());
                false
            }
            Command::Close => true,
        }
    }

    async fn on_backend_message(&mut self, message: BackendMessage) {
        match message {
            BackendMessage::Event { watched, event } => {
                self.on_native_event(watched, event).await;
            }
            BackendMessage::Error { watched, error } => {
                self.on_native_error(watched, error).await;
            }
        }
    }

    async fn on_native_event(&mut self, watched: PathBuf, event: RawEvent) {
        if self.closed {
            return;
        }

        let entry_path = match &event.entry {
            Some(name) => watched.join(name),
            None => watched.clone(),
        };
        self.emit(WatchEvent::Raw {
            kind: event.kind,
            path: entry_path.clone(),
            watched_path: watched.clone(),
        });

        // A directory-level watcher can substitute for a file-level watcher
        // that missed its own event. Snapshot the child's subscribers now,
        // before compensation or rescans change the registry underneath us.
        let descendant = (entry_path != watched)
            .then(|| self.native.subscribers(&entry_path))
            .flatten();

        if event.kind == RawKind::Rename {
            self.rename_compensation(&watched).await;
        }

        if let Some(subscribers) = self.native.subscribers(&watched) {
            for subscriber in subscribers {
                self.dispatch(subscriber, None).await;
            }
        }

        if let Some(subscribers) = descendant {
            self.emit(WatchEvent::Raw {
                kind: event.kind,
                path: entry_path.clone(),
                watched_path: entry_path.clone(),
            });
            for subscriber in subscribers {
                self.dispatch(subscriber, None).await;
            }
        }
    }

    /// Synthesize deletes the platform never reported.
    ///
    /// A rename of a watched directory delivers no remove on some platforms;
    /// when the watched path is gone and was a directory, removals are
    /// propagated for it and for any other registry key stranded beneath it.
    async fn rename_compensation(&mut self, watched: &Path) {
        if path_exists(watched).await {
            return;
        }
        if !self.native.was_dir(watched) {
            return;
        }
        if let (Some(parent), Some(name)) = (watched.parent(), watched.file_name()) {
            let parent = parent.to_path_buf();
            let name = name.to_os_string();
            self.remove_entry(parent, name, Some(true)).await;
        }
        for key in self.native.keys() {
            if key != watched && key.starts_with(watched) && !path_exists(&key).await {
                if let (Some(parent), Some(name)) = (key.parent(), key.file_name()) {
                    let parent = parent.to_path_buf();
                    let name = name.to_os_string();
                    self.remove_entry(parent, name, None).await;
                }
            }
        }
    }

    async fn on_native_error(&mut self, watched: PathBuf, error: io::Error) {
        self.native.mark_unusable(&watched);

        // Windows reports EPERM on handles for paths being torn down. Probe
        // the path; only a successful open means the error is real.
        if cfg!(windows) && error.kind() == io::ErrorKind::PermissionDenied {
            if tokio::fs::File::open(&watched).await.is_err() {
                crate::debug_event!("engine", "eperm swallowed", "{}", watched.display());
                return;
            }
        }

        self.handle_error(WatchError::Native {
            path: watched,
            source: error,
        });
    }

    async fn dispatch(&mut self, subscriber: Subscriber, stats: Option<FileStats>) {
        match subscriber {
            Subscriber::File(file) => self.on_file_event(&file.path, stats).await,
            Subscriber::Dir(dir) => self.on_dir_event(dir, stats).await,
        }
    }

    /// Sample every polling entry that is due.
    async fn poll_due(&mut self) {
        if self.closed {
            return;
        }
        let now = Instant::now();
        for path in self.polling.due_paths(now) {
            let current = backend::stat_snapshot(&path).await;
            let Some(previous) = self.polling.record_sample(&path, current, now) else {
                continue;
            };

            self.emit(WatchEvent::Raw {
                kind: RawKind::Change,
                path: path.clone(),
                watched_path: path.clone(),
            });

            for subscriber in self.polling.subscribers(&path) {
                match subscriber {
                    Subscriber::File(file) => {
                        let fired = current.size != previous.size
                            || current.mtime_ms > previous.mtime_ms
                            || current.mtime_ms == 0;
                        if fired {
                            self.on_file_event(&file.path, Some(current)).await;
                        }
                    }
                    Subscriber::Dir(dir) => {
                        self.on_dir_event(dir, Some(current)).await;
                    }
                }
            }
        }
    }

    /// Register `path` with the backend the configuration selects and track
    /// its basename under the parent directory.
    pub(crate) fn watch_with_backend(
        &mut self,
        path: &Path,
        subscriber: Subscriber,
        stats: FileStats,
    ) -> Option<WatchCloser> {
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            self.watched.entry(parent).add(name);
        }

        if self.cfg.watch.use_polling {
            let interval = if self.cfg.watch.enable_binary_interval
                && crate::binary::is_binary_path(path)
            {
                self.cfg.watch.binary_interval()
            } else {
                self.cfg.watch.interval()
            };
            let options = PollOptions {
                persistent: self.cfg.watch.persistent,
                interval,
            };
            Some(self.polling.subscribe(path, options, subscriber, stats))
        } else {
            match self
                .native
                .subscribe(self.backend.as_mut(), path, self.cfg.watch.persistent, subscriber)
            {
                Ok(closer) => Some(closer),
                Err(error) => {
                    self.handle_error(error);
                    None
                }
            }
        }
    }

    pub(crate) fn record_closer(&mut self, path: &Path, closer: WatchCloser) {
        self.closers.entry(path.to_path_buf()).or_default().push(closer);
    }

    /// Release every subscription recorded under `path`.
    pub(crate) fn close_path(&mut self, path: &Path) {
        if let Some(closers) = self.closers.remove(path) {
            for closer in closers {
                self.release_closer(&closer);
            }
        }
    }

    fn release_closer(&mut self, closer: &WatchCloser) {
        match closer {
            WatchCloser::Native { .. } | WatchCloser::NativeUnshared { .. } => {
                self.native.release(closer);
            }
            WatchCloser::Polling { .. } => {
                self.polling.release(closer);
            }
        }
    }

    /// Drop subscriptions for paths without emitting removal events.
    fn unwatch_paths(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            let abs = absolutize(&path);
            self.close_path(&abs);
            if let (Some(parent), Some(name)) = (abs.parent(), abs.file_name()) {
                if let Some(dir) = self.watched.get_mut(parent) {
                    dir.remove(name);
                }
            }
            self.watched.remove_dir(&abs);
            crate::debug_event!("engine", "unwatched", "{}", abs.display());
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let paths: Vec<PathBuf> = self.closers.keys().cloned().collect();
        for path in paths {
            self.close_path(&path);
        }
        self.native.close_all();
        self.polling.clear_all();
    }

    pub(crate) fn is_ignored(&self, path: &Path) -> bool {
        self.cfg.filter.is_ignored(path)
    }

    pub(crate) fn emit(&self, event: WatchEvent) {
        if self.closed {
            return;
        }
        self.bus.send(event);
    }

    /// Surface an error on the event channel.
    ///
    /// Vanish transients are not errors: they are recovered into `unlink`
    /// elsewhere, so they stay off the channel. Returns whether anything was
    /// surfaced.
    pub(crate) fn handle_error(&mut self, error: WatchError) -> bool {
        if self.closed || error.is_not_found() {
            return false;
        }
        tracing::warn!("[engine] {error}");
        self.emit(WatchEvent::Error {
            message: error.to_string(),
        });
        true
    }

    /// Account for one more pending deep add.
    pub(crate) fn incr_ready(&mut self) {
        if !self.ready_emitted {
            self.ready_pending += 1;
        }
    }

    /// Account for one finished deep add; emits `ready` on the zero
    /// transition, once.
    pub(crate) fn ready_tick(&mut self) {
        if self.ready_emitted {
            return;
        }
        self.ready_pending = self.ready_pending.saturating_sub(1);
        if self.ready_pending == 0 {
            self.ready_emitted = true;
            crate::log_event!("engine", "ready");
            self.emit(WatchEvent::Ready);
        }
    }
}

/// Resolve a user-supplied path against the working directory.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}
