//! Configuration file watching with debounce.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

fn is_relevant(event: &notify::Event, config_path: &Path) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_)
    );
    // Editors often replace the file, so compare by name within the
    // watched directory rather than by full path.
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == config_path.file_name())
}

/// Watch the config file's directory and invoke `on_change` after each
/// burst of relevant events has settled. Runs until the watcher backend
/// drops its channel or the surrounding task is dropped.
pub async fn watch_config<F>(config_path: PathBuf, debounce: Duration, mut on_change: F)
where
    F: FnMut(),
{
    let (tx, mut rx) = mpsc::channel::<notify::Result<notify::Event>>(16);
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.blocking_send(res);
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            error!(error = %err, "failed to create config file watcher");
            return;
        }
    };

    let watch_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!(path = %watch_dir.display(), error = %err, "failed to watch config directory");
        return;
    }

    let debounce = if debounce.is_zero() {
        DEFAULT_DEBOUNCE
    } else {
        debounce
    };
    info!(path = %config_path.display(), debounce = ?debounce, "started configuration watcher");

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) if is_relevant(&event, &config_path) => {
                // Swallow the rest of the burst before reloading.
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                info!(path = %config_path.display(), "config file changed, attempting to reload");
                on_change();
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "error watching config file"),
        }
    }
    warn!("watcher events channel closed unexpectedly, stopping watcher");
}
