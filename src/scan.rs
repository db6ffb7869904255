//! Shallow directory reader.
//!
//! Lists one level of a directory, attaching both the followed and the
//! link-local view of each entry. Results are sorted by name so rescans diff
//! deterministically.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::WatchError;
use crate::events::FileStats;

/// One directory entry with its stat snapshot.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub name: OsString,
    pub path: PathBuf,
    /// Followed stats when `follow_symlinks` and the link is intact,
    /// otherwise the lstat view.
    pub stats: FileStats,
    /// From lstat, regardless of follow mode.
    pub is_symlink: bool,
}

/// Read the entries of `dir` at depth zero.
pub async fn read_dir_level(dir: &Path, follow_symlinks: bool) -> Result<Vec<ScanEntry>, WatchError> {
    let mut reader = tokio::fs::read_dir(dir).await.map_err(|e| WatchError::Scan {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut entries = Vec::new();
    loop {
        let next = reader.next_entry().await.map_err(|e| WatchError::Scan {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let Some(entry) = next else { break };
        let path = entry.path();

        // Entries can vanish between the listing and the stat.
        let Ok(lstat) = tokio::fs::symlink_metadata(&path).await else {
            continue;
        };
        let is_symlink = lstat.file_type().is_symlink();

        let followed = if is_symlink && follow_symlinks {
            tokio::fs::metadata(&path).await.ok()
        } else {
            None
        };
        let meta = followed.unwrap_or(lstat);

        let mut stats = FileStats::from_metadata(&meta);
        stats.is_symlink = is_symlink;

        entries.push(ScanEntry {
            name: entry.file_name(),
            path,
            stats,
            is_symlink,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_entries_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = read_dir_level(dir.path(), true).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        assert!(!entries[0].stats.is_dir);
        assert!(entries[2].stats.is_dir);
    }

    #[tokio::test]
    async fn missing_directory_is_a_scan_error() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("nope");
        let err = read_dir_level(&gone, true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_flagged_in_both_modes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link")).unwrap();

        let followed = read_dir_level(dir.path(), true).await.unwrap();
        let link = followed.iter().find(|e| e.name == "link").unwrap();
        assert!(link.is_symlink);
        assert_eq!(link.stats.size, 1);

        let leaf = read_dir_level(dir.path(), false).await.unwrap();
        let link = leaf.iter().find(|e| e.name == "link").unwrap();
        assert!(link.is_symlink);
        assert!(link.stats.is_symlink);
    }
}
