//! End-to-end engine scenarios over the deterministic mock backend.
//!
//! Filesystem state is real (tempdirs); platform notifications are injected
//! through the mock controller so every test is deterministic.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use pathwatch::{MockController, PathWatcher, RawKind, WatchConfig, WatchEvent};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn watcher_with_mock(
    config: WatchConfig,
    paths: Vec<PathBuf>,
) -> (
    PathWatcher,
    MockController,
    broadcast::Receiver<WatchEvent>,
) {
    let controller = MockController::new();
    let watcher = PathWatcher::builder()
        .config(config)
        .paths(paths)
        .backend(controller.factory())
        .build()
        .expect("failed to build watcher");
    let rx = watcher.subscribe();
    (watcher, controller, rx)
}

/// Next non-raw event, with a timeout guard.
async fn next_fs_event(rx: &mut broadcast::Receiver<WatchEvent>) -> WatchEvent {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if !matches!(event, WatchEvent::Raw { .. }) {
            return event;
        }
    }
}

/// Collect every non-raw event up to and including `ready`.
async fn drain_until_ready(rx: &mut broadcast::Receiver<WatchEvent>) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_fs_event(rx).await;
        let done = event == WatchEvent::Ready;
        events.push(event);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn file_change_after_add() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f.txt");
    std::fs::write(&file, "v1").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![file.clone()]);

    let event = next_fs_event(&mut rx).await;
    assert!(
        matches!(&event, WatchEvent::Add { path, .. } if path == &file),
        "expected add, got {event}"
    );
    assert_eq!(next_fs_event(&mut rx).await, WatchEvent::Ready);

    std::fs::write(&file, "v2").unwrap();
    controller.emit(&file, RawKind::Change, None);

    let event = next_fs_event(&mut rx).await;
    assert!(
        matches!(&event, WatchEvent::Change { path, .. } if path == &file),
        "expected change, got {event}"
    );

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn ignore_initial_suppresses_pre_existing_entries() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a"), "1").unwrap();
    std::fs::write(dir.path().join("b"), "2").unwrap();

    let config = WatchConfig {
        ignore_initial: true,
        ..WatchConfig::default()
    };
    let (watcher, _controller, mut rx) =
        watcher_with_mock(config, vec![dir.path().to_path_buf()]);

    // Ready arrives with no add/addDir before it.
    assert_eq!(next_fs_event(&mut rx).await, WatchEvent::Ready);

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn rescan_synthesizes_add_for_new_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![root.clone()]);

    let event = next_fs_event(&mut rx).await;
    assert!(matches!(&event, WatchEvent::AddDir { path, .. } if path == &root));
    assert_eq!(next_fs_event(&mut rx).await, WatchEvent::Ready);

    // The platform reports a rename in the directory; the rescan diff finds
    // the new child.
    let new_file = root.join("new");
    std::fs::write(&new_file, "x").unwrap();
    controller.emit(&root, RawKind::Rename, Some("new"));

    let event = next_fs_event(&mut rx).await;
    assert!(
        matches!(&event, WatchEvent::Add { path, .. } if path == &new_file),
        "expected add for new file, got {event}"
    );

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn dir_rename_compensates_missing_deletes() {
    let dir = TempDir::new().unwrap();
    let watched_dir = dir.path().join("d");
    std::fs::create_dir(&watched_dir).unwrap();
    let child = watched_dir.join("c");
    std::fs::write(&child, "x").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![watched_dir.clone()]);
    drain_until_ready(&mut rx).await;

    // Rename the directory out from under the watch. Some platforms report
    // only a rename on the old path, never a delete.
    std::fs::rename(&watched_dir, dir.path().join("d2")).unwrap();
    controller.emit(&watched_dir, RawKind::Rename, None);

    assert_eq!(
        next_fs_event(&mut rx).await,
        WatchEvent::Unlink {
            path: child.clone()
        }
    );
    assert_eq!(
        next_fs_event(&mut rx).await,
        WatchEvent::UnlinkDir {
            path: watched_dir.clone()
        }
    );

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn same_path_shares_one_native_handle() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f");
    std::fs::write(&file, "x").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![file.clone(), file.clone()]);
    drain_until_ready(&mut rx).await;

    assert_eq!(controller.open_count(&file), 1);

    watcher.close().await.unwrap();
    assert_eq!(controller.closed(), vec![file]);
}

#[tokio::test]
async fn close_stops_emission() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f");
    std::fs::write(&file, "x").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![file.clone()]);
    drain_until_ready(&mut rx).await;

    watcher.close().await.unwrap();
    controller.emit(&file, RawKind::Change, None);

    let result = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("receiver should report closure promptly");
    assert!(matches!(
        result,
        Err(broadcast::error::RecvError::Closed)
    ));
}

#[tokio::test]
async fn unwatch_releases_subscriptions_silently() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f");
    std::fs::write(&file, "x").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![file.clone()]);
    drain_until_ready(&mut rx).await;

    watcher.unwatch([&file]).unwrap();
    let snapshot = watcher.watched().await.unwrap();
    let parent = file.parent().unwrap().to_path_buf();
    assert!(snapshot[&parent].is_empty());
    assert_eq!(controller.closed(), vec![file]);

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn backend_error_marks_entry_unusable_and_leaks_the_handle() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f");
    std::fs::write(&file, "x").unwrap();

    let (watcher, controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![file.clone()]);
    drain_until_ready(&mut rx).await;

    controller.error(&file, io::Error::other("device failure"));
    let event = next_fs_event(&mut rx).await;
    assert!(matches!(event, WatchEvent::Error { .. }));

    // The entry is unusable; teardown must not close its handle.
    watcher.close().await.unwrap();
    assert!(controller.closed().is_empty());
}

#[tokio::test]
async fn depth_limit_stops_recursion() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let sub = root.join("sub");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(sub.join("inner.txt"), "x").unwrap();

    let config = WatchConfig {
        depth: Some(0),
        ..WatchConfig::default()
    };
    let (watcher, _controller, mut rx) = watcher_with_mock(config, vec![root.clone()]);

    let events = drain_until_ready(&mut rx).await;
    let paths: Vec<_> = events.iter().filter_map(|e| e.path().cloned()).collect();
    assert!(paths.contains(&root));
    assert!(paths.contains(&sub));
    // Nothing below the depth limit is reported.
    assert!(!paths.contains(&sub.join("inner.txt")));

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn ignored_paths_never_surface() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::write(root.join("keep.txt"), "x").unwrap();
    std::fs::write(root.join("skip.log"), "x").unwrap();

    let config = WatchConfig {
        ignored: vec!["**/*.log".to_string()],
        ..WatchConfig::default()
    };
    let (watcher, _controller, mut rx) = watcher_with_mock(config, vec![root.clone()]);

    let events = drain_until_ready(&mut rx).await;
    let paths: Vec<_> = events.iter().filter_map(|e| e.path().cloned()).collect();
    assert!(paths.contains(&root.join("keep.txt")));
    assert!(!paths.contains(&root.join("skip.log")));

    watcher.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_cycle_terminates() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::os::unix::fs::symlink(&root, root.join("a")).unwrap();

    let (watcher, _controller, mut rx) =
        watcher_with_mock(WatchConfig::default(), vec![root.clone()]);

    let mut dirs = Vec::new();
    loop {
        match next_fs_event(&mut rx).await {
            WatchEvent::Ready => break,
            WatchEvent::AddDir { path, .. } => dirs.push(path),
            other => panic!("unexpected event: {other}"),
        }
    }

    // The cycle is entered once: the root, the link, and nothing deeper.
    dirs.sort();
    assert_eq!(dirs, vec![root.clone(), root.join("a")]);

    watcher.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn leaf_symlinks_report_adds_without_recursion() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let target = root.join("target");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("inner.txt"), "x").unwrap();
    std::os::unix::fs::symlink(&target, root.join("link")).unwrap();

    let config = WatchConfig {
        follow_symlinks: false,
        ..WatchConfig::default()
    };
    let (watcher, _controller, mut rx) = watcher_with_mock(config, vec![root.clone()]);

    let events = drain_until_ready(&mut rx).await;
    let link_adds = events
        .iter()
        .filter(|e| matches!(e, WatchEvent::Add { path, .. } if path == &root.join("link")))
        .count();
    assert_eq!(link_adds, 1);

    watcher.close().await.unwrap();
}
