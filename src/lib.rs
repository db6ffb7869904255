//! Cross-platform filesystem-watch engine.
//!
//! Watches files, directories, and whole trees through either an
//! event-driven platform backend or a stat-polling sampler, and emits a
//! de-duplicated, normalized stream of change events: `add`, `addDir`,
//! `change`, `unlink`, `unlinkDir`, `ready`, `error`, plus a `raw`
//! passthrough.
//!
//! ```no_run
//! use pathwatch::PathWatcher;
//!
//! # async fn demo() -> Result<(), pathwatch::WatchError> {
//! let watcher = PathWatcher::builder().path("src").build()?;
//! let mut events = watcher.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod binary;
pub mod config;
mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod filter;
pub mod logging;
pub mod registry;
pub mod scan;
pub mod symlink;
pub mod throttle;
pub mod watched;

pub use backend::{BackendMessage, EventBackend, MockController, NotifyBackend, RawKind};
pub use config::{Settings, WatchConfig};
pub use error::WatchError;
pub use events::{EventBroadcaster, FileStats, WatchEvent};
pub use facade::{BackendFactory, PathWatcher, PathWatcherBuilder};
pub use throttle::{ThrottleAction, Throttler};
pub use watched::{WatchedDir, WatchedDirs};
