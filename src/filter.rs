//! Ignore predicate over glob patterns.
//!
//! Paths matching any configured pattern, or living under a directory that
//! does, are invisible to the engine: they are never scanned, watched, or
//! reported.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::WatchError;

/// Compiled ignore patterns.
#[derive(Debug, Default)]
pub struct IgnoreFilter {
    set: Option<GlobSet>,
}

impl IgnoreFilter {
    /// Compile the given glob patterns. An empty list ignores nothing.
    pub fn new(patterns: &[String]) -> Result<Self, WatchError> {
        if patterns.is_empty() {
            return Ok(Self { set: None });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| WatchError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| WatchError::Pattern {
            pattern: patterns.join(","),
            reason: e.to_string(),
        })?;
        Ok(Self { set: Some(set) })
    }

    /// Whether `path` or any of its ancestors matches an ignore pattern.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };
        if set.is_match(path) {
            return true;
        }
        path.ancestors().skip(1).any(|ancestor| set.is_match(ancestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_ignores_nothing() {
        let filter = IgnoreFilter::new(&[]).unwrap();
        assert!(!filter.is_ignored(Path::new("/any/path")));
    }

    #[test]
    fn matches_path_and_ancestors() {
        let filter = IgnoreFilter::new(&["**/node_modules".to_string()]).unwrap();
        assert!(filter.is_ignored(Path::new("/p/node_modules")));
        assert!(filter.is_ignored(Path::new("/p/node_modules/dep/index.js")));
        assert!(!filter.is_ignored(Path::new("/p/src/index.js")));
    }

    #[test]
    fn extension_globs_apply() {
        let filter = IgnoreFilter::new(&["**/*.log".to_string()]).unwrap();
        assert!(filter.is_ignored(Path::new("/var/out/build.log")));
        assert!(!filter.is_ignored(Path::new("/var/out/build.txt")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = IgnoreFilter::new(&["a{".to_string()]).unwrap_err();
        assert!(matches!(err, WatchError::Pattern { .. }));
    }
}
