//! Stat sampling for the polling primitive.

use std::path::Path;

use crate::events::FileStats;

/// Stat `path` into a snapshot; a vanished path yields the zeroed transient.
pub async fn stat_snapshot(path: &Path) -> FileStats {
    match tokio::fs::metadata(path).await {
        Ok(meta) => FileStats::from_metadata(&meta),
        Err(_) => FileStats::missing(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn samples_live_and_missing_paths() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "abc").unwrap();

        let live = stat_snapshot(&file).await;
        assert_eq!(live.size, 3);
        assert!(!live.is_missing());

        let gone = stat_snapshot(&dir.path().join("nope")).await;
        assert!(gone.is_missing());
    }
}
