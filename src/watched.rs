//! Per-directory child registries.
//!
//! The engine keeps an authoritative set of basenames under every watched
//! directory. Directory rescans diff the live listing against this set to
//! synthesize `add`/`unlink` events the platform may never deliver.

use std::collections::{BTreeSet, HashMap};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// The tracked children of one directory.
#[derive(Debug, Default)]
pub struct WatchedDir {
    children: BTreeSet<OsString>,
}

impl WatchedDir {
    pub fn add(&mut self, name: impl Into<OsString>) {
        self.children.insert(name.into());
    }

    /// Returns `true` when the name was present.
    pub fn remove(&mut self, name: &OsStr) -> bool {
        self.children.remove(name)
    }

    pub fn has(&self, name: &OsStr) -> bool {
        self.children.contains(name)
    }

    /// Tracked basenames in sorted order.
    pub fn children(&self) -> impl Iterator<Item = &OsString> {
        self.children.iter()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// All per-directory registries, keyed by absolute path.
#[derive(Debug, Default)]
pub struct WatchedDirs {
    dirs: HashMap<PathBuf, WatchedDir>,
}

impl WatchedDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry for `dir`, created empty when absent.
    pub fn entry(&mut self, dir: &Path) -> &mut WatchedDir {
        self.dirs.entry(dir.to_path_buf()).or_default()
    }

    pub fn get(&self, dir: &Path) -> Option<&WatchedDir> {
        self.dirs.get(dir)
    }

    pub fn get_mut(&mut self, dir: &Path) -> Option<&mut WatchedDir> {
        self.dirs.get_mut(dir)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains_key(dir)
    }

    pub fn remove_dir(&mut self, dir: &Path) -> Option<WatchedDir> {
        self.dirs.remove(dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Copy of the whole registry, for facade-level inspection.
    pub fn snapshot(&self) -> HashMap<PathBuf, Vec<OsString>> {
        self.dirs
            .iter()
            .map(|(dir, watched)| (dir.clone(), watched.children().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_children_per_directory() {
        let mut watched = WatchedDirs::new();

        watched.entry(Path::new("/project/src")).add("main.rs");
        watched.entry(Path::new("/project/src")).add("lib.rs");
        watched.entry(Path::new("/project/tests")).add("it.rs");

        let src = watched.get(Path::new("/project/src")).unwrap();
        assert_eq!(src.len(), 2);
        assert!(src.has(OsStr::new("main.rs")));
        assert!(!src.has(OsStr::new("it.rs")));
    }

    #[test]
    fn children_come_back_sorted() {
        let mut watched = WatchedDirs::new();
        let dir = watched.entry(Path::new("/d"));
        dir.add("b");
        dir.add("a");
        dir.add("c");

        let names: Vec<_> = dir.children().cloned().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_reports_prior_presence() {
        let mut watched = WatchedDirs::new();
        watched.entry(Path::new("/d")).add("x");

        let dir = watched.get_mut(Path::new("/d")).unwrap();
        assert!(dir.remove(OsStr::new("x")));
        assert!(!dir.remove(OsStr::new("x")));
        assert!(dir.is_empty());
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut watched = WatchedDirs::new();
        watched.entry(Path::new("/d")).add("x");

        let snap = watched.snapshot();
        assert_eq!(snap[Path::new("/d")], vec![OsString::from("x")]);
    }
}
