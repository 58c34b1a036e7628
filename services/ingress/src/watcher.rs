//! Hot-reload watcher for the routing file.
//!
//! Uses `notify` to watch the file's parent directory (which handles
//! editor rename-over-save patterns, e.g. vim's `:w` strategy). After a
//! change to the file a 50ms debounce fires and `on_change` is called once
//! for the whole burst. What a reload means is up to the caller.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Quiet period that collapses a burst of file events into one reload.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(50);

/// Spawn the background task that watches `path` and calls `on_change`
/// after it is modified.
///
/// Abort the returned handle to stop watching.
pub fn spawn_route_watcher<F>(path: PathBuf, on_change: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = watch_loop(&path, on_change).await {
            error!(path = %path.display(), error = %e, "Routing file watcher exited unexpectedly");
        }
    })
}

async fn watch_loop<F: Fn()>(path: &Path, on_change: F) -> anyhow::Result<()> {
    let Some(file_name) = path.file_name().map(OsString::from) else {
        anyhow::bail!("{} does not name a file", path.display());
    };

    let (tx, mut rx) = mpsc::channel::<()>(1);

    // notify callbacks fire on a background thread; bridge via channel.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                use notify::EventKind::*;
                let relevant = matches!(event.kind, Create(_) | Modify(_) | Remove(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant {
                    let _ = tx.try_send(());
                }
            }
        },
        notify::Config::default(),
    )?;

    let watch_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !watch_dir.exists() {
        warn!(path = %path.display(), dir = %watch_dir.display(), "Hot reload disabled: directory not found");
        return Ok(());
    }
    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "Routing file watcher started");

    while rx.recv().await.is_some() {
        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while rx.try_recv().is_ok() {}

        info!(path = %path.display(), "Routing file changed");
        on_change();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_change_triggers_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[]").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = spawn_route_watcher(path.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, r#"[{"url_name": "a", "port": 1}]"#).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(calls.load(Ordering::SeqCst) >= 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_unrelated_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[]").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = spawn_route_watcher(path.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join("other.txt"), "noise").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        handle.abort();
    }
}
