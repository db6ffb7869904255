//! Deterministic in-memory event backend.
//!
//! Used by the test suite (and embedders that drive the engine themselves)
//! to inject raw notifications without touching platform watchers.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{BackendMessage, EventBackend, NativeHandle, RawEvent, RawKind};
use crate::error::WatchError;
use crate::facade::BackendFactory;

#[derive(Default)]
struct MockShared {
    tx: Option<mpsc::UnboundedSender<BackendMessage>>,
    opened: Vec<PathBuf>,
    closed: Vec<PathBuf>,
}

/// Handle for injecting events and inspecting backend activity.
#[derive(Clone, Default)]
pub struct MockController {
    inner: Arc<Mutex<MockShared>>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend factory to hand to the watcher builder.
    pub fn factory(&self) -> BackendFactory {
        let inner = Arc::clone(&self.inner);
        Box::new(move |tx| {
            if let Ok(mut shared) = inner.lock() {
                shared.tx = Some(tx);
            }
            Ok(Box::new(MockBackend { inner }))
        })
    }

    /// Inject a raw notification for a watched path.
    pub fn emit(&self, watched: impl Into<PathBuf>, kind: RawKind, entry: Option<&str>) {
        let message = BackendMessage::Event {
            watched: watched.into(),
            event: RawEvent {
                kind,
                entry: entry.map(OsString::from),
            },
        };
        self.send(message);
    }

    /// Inject a backend error for a watched path.
    pub fn error(&self, watched: impl Into<PathBuf>, error: io::Error) {
        self.send(BackendMessage::Error {
            watched: watched.into(),
            error,
        });
    }

    fn send(&self, message: BackendMessage) {
        let tx = self
            .inner
            .lock()
            .ok()
            .and_then(|shared| shared.tx.clone());
        if let Some(tx) = tx {
            let _ = tx.send(message);
        }
    }

    /// Every path passed to `open`, in order, including reopens.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .map(|shared| shared.opened.clone())
            .unwrap_or_default()
    }

    /// Every handle close observed, in order.
    pub fn closed(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .map(|shared| shared.closed.clone())
            .unwrap_or_default()
    }

    /// How many times `path` was opened.
    pub fn open_count(&self, path: &Path) -> usize {
        self.opened().iter().filter(|p| p.as_path() == path).count()
    }
}

/// The backend half; constructed through [`MockController::factory`].
pub struct MockBackend {
    inner: Arc<Mutex<MockShared>>,
}

impl EventBackend for MockBackend {
    fn open(&mut self, path: &Path) -> Result<Box<dyn NativeHandle>, WatchError> {
        if let Ok(mut shared) = self.inner.lock() {
            shared.opened.push(path.to_path_buf());
        }
        Ok(Box::new(MockHandle {
            path: path.to_path_buf(),
            inner: Arc::clone(&self.inner),
            closed: false,
        }))
    }
}

struct MockHandle {
    path: PathBuf,
    inner: Arc<Mutex<MockShared>>,
    closed: bool,
}

impl NativeHandle for MockHandle {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut shared) = self.inner.lock() {
            shared.closed.push(self.path.clone());
        }
    }
}
