//! File-system watcher that turns configuration file changes into [`ConfigEvent`]s.
//!
//! The parent directory is watched rather than the file itself, so the file
//! may be created after start-up and editors that replace the file on save
//! keep being seen.
//!
//! | notify event                 | event     |
//! |------------------------------|-----------|
//! | `Create`                     | `Added`   |
//! | `Modify` (except metadata)   | `Updated` |
//! | anything else                | none      |

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use nelm_core::{ConfigEvent, ConfigEventKind};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::config::ConfigError;

/// Decides which configuration event, if any, a file-system event represents.
pub fn classify_event(kind: &EventKind) -> Option<ConfigEventKind> {
    match kind {
        EventKind::Create(_) => Some(ConfigEventKind::Added),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ConfigEventKind::Updated),
        _ => None,
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Starts watching `path` and spawns the task that publishes its changes.
/// Events are keyed by `app_id`.
///
/// A burst of file-system events that is already queued when the task wakes
/// up is published as one event; `Added` wins over `Updated`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the parent directory cannot be created and
/// [`ConfigError::Watch`] if the watch cannot be registered.
pub fn spawn_config_watcher(
    path: PathBuf,
    app_id: String,
    events: broadcast::Sender<ConfigEvent>,
    mut shutdown: watch::Receiver<()>,
) -> Result<JoinHandle<()>, ConfigError> {
    let dir = watched_dir(&path);
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();

    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| {
            if fs_tx.send(result).is_err() {
                debug!("configuration watcher task has stopped; dropping event");
            }
        },
        Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for configuration changes", path.display());

    Ok(tokio::spawn(async move {
        // Dropping the watcher unregisters the watch.
        let _watcher = watcher;

        loop {
            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = fs_rx.recv() => match received {
                    Some(result) => result,
                    None => break,
                },
            };

            let mut kind = None;
            let mut pending = Some(first);
            while let Some(result) = pending.take() {
                match result {
                    Ok(event) if touches(&event, &file_name) => {
                        kind = match (kind, classify_event(&event.kind)) {
                            (Some(ConfigEventKind::Added), _) => Some(ConfigEventKind::Added),
                            (current, None) => current,
                            (_, found) => found,
                        };
                    }
                    Ok(_) => {}
                    Err(e) => error!("configuration watcher error: {e}"),
                }
                pending = fs_rx.try_recv().ok();
            }

            let Some(kind) = kind else { continue };
            info!("configuration file {} changed: {kind:?}", path.display());
            let event = ConfigEvent {
                config_key: app_id.clone(),
                kind,
            };
            if events.send(event).is_err() {
                debug!("no configuration listeners");
            }
        }
        debug!("configuration watcher stopped");
    }))
}
