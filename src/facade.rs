//! Public subscription surface.
//!
//! A [`PathWatcher`] owns the engine task. Commands travel over an mpsc
//! channel; events come back on a broadcast channel any number of consumers
//! may subscribe to.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::{BackendMessage, EventBackend, NotifyBackend};
use crate::config::WatchConfig;
use crate::engine::{Command, Engine, EngineConfig};
use crate::error::WatchError;
use crate::events::{EventBroadcaster, WatchEvent};
use crate::filter::IgnoreFilter;

/// Constructs the event backend once the engine's channel exists.
pub type BackendFactory = Box<
    dyn FnOnce(
            mpsc::UnboundedSender<BackendMessage>,
        ) -> Result<Box<dyn EventBackend>, WatchError>
        + Send,
>;

/// Watches a set of paths and streams normalized change events.
pub struct PathWatcher {
    cmd_tx: mpsc::UnboundedSender<Command>,
    bus: EventBroadcaster,
    handle: Option<JoinHandle<()>>,
}

impl PathWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> PathWatcherBuilder {
        PathWatcherBuilder::new()
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.bus.subscribe()
    }

    /// Watch additional paths.
    pub fn add(&self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Result<(), WatchError> {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        self.cmd_tx
            .send(Command::Add(paths))
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Stop watching paths. No removal events are emitted.
    pub fn unwatch(
        &self,
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Result<(), WatchError> {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        self.cmd_tx
            .send(Command::Unwatch(paths))
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Snapshot of watched directories and their tracked children.
    pub async fn watched(&self) -> Result<HashMap<PathBuf, Vec<OsString>>, WatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Watched(reply_tx))
            .map_err(|_| WatchError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WatchError::ChannelClosed)
    }

    /// Shut the watcher down: release every subscription and stop emitting.
    pub async fn close(mut self) -> Result<(), WatchError> {
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(handle) = self.handle.take() {
            handle.await.map_err(|e| WatchError::InitFailed {
                reason: format!("engine task panicked: {e}"),
            })?;
        }
        Ok(())
    }
}

/// Builder for constructing a [`PathWatcher`].
pub struct PathWatcherBuilder {
    config: WatchConfig,
    paths: Vec<PathBuf>,
    backend: Option<BackendFactory>,
    event_capacity: usize,
}

impl PathWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: WatchConfig::default(),
            paths: Vec::new(),
            backend: None,
            event_capacity: 1024,
        }
    }

    /// Set the watch configuration.
    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an initial path to watch.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Add initial paths to watch.
    pub fn paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Replace the platform backend, e.g. with the mock for tests.
    pub fn backend(mut self, factory: BackendFactory) -> Self {
        self.backend = Some(factory);
        self
    }

    /// Capacity of the outbound event channel.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the engine task. Must run inside a tokio runtime.
    pub fn build(self) -> Result<PathWatcher, WatchError> {
        let filter = IgnoreFilter::new(&self.config.ignored)?;
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let backend = match self.backend {
            Some(factory) => factory(raw_tx)?,
            None => Box::new(NotifyBackend::new(raw_tx)?),
        };

        let bus = EventBroadcaster::new(self.event_capacity);
        let initial: Vec<PathBuf> = self
            .paths
            .iter()
            .map(|p| crate::engine::absolutize(p))
            .collect();

        let engine = Engine::new(
            EngineConfig {
                watch: self.config,
                filter,
            },
            backend,
            bus.clone(),
        );
        let handle = tokio::spawn(engine.run(raw_rx, cmd_rx, initial));

        Ok(PathWatcher {
            cmd_tx,
            bus,
            handle: Some(handle),
        })
    }
}

impl Default for PathWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
