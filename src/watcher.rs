//! Hot reload of the configuration file
//!
//! The parent directory is watched instead of the file itself so that editors
//! and deploy tools that write a temporary file and rename it over the original
//! keep triggering reloads.

use crate::bus::EventBus;
use crate::config::ConfigStore;
use crate::error::{HearthError, Result};
use crate::events::Event;
use notify::{Event as FsEvent, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Quiet period after the last matching write before reloading
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Idle,
    DebouncingWrite,
    Reloading,
}

/// Re-read the configuration and tell everyone about it.
///
/// On success the new snapshot is live, a `Reload` event is published and the
/// optional `on_reload` notifier is woken. On failure the previous snapshot
/// stays active and only the operator log hears about it.
///
/// # Errors
///
/// Returns the load error when the file cannot be read, parsed or validated
pub fn reload_and_notify(
    store: &ConfigStore,
    bus: &EventBus,
    on_reload: Option<&Notify>,
) -> Result<()> {
    match store.reload() {
        Ok(_) => {
            info!("Config reloaded successfully");
            bus.publish(Event::Reload);
            if let Some(notify) = on_reload {
                notify.notify_one();
            }
            Ok(())
        }
        Err(e) => {
            error!(
                "Error reloading config {}: {e}. Keeping current configuration.",
                store.path().display()
            );
            Err(e)
        }
    }
}

/// Watches the configuration file and reloads it on change.
pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    bus: EventBus,
    on_reload: Option<Arc<Notify>>,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(store: Arc<ConfigStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            on_reload: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Notifier woken after every successful reload
    #[must_use]
    pub fn with_reload_hook(mut self, notify: Arc<Notify>) -> Self {
        self.on_reload = Some(notify);
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching in a background task that ends when `cancel_token` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration directory cannot be watched
    pub fn spawn(self, cancel_token: CancellationToken) -> Result<tokio::task::JoinHandle<()>> {
        let path = absolute(self.store.path())?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| HearthError::from("Configuration path has no parent directory"))?;
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| HearthError::from("Configuration path has no file name"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<FsEvent>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Starting config file watcher for: {}", path.display());

        Ok(tokio::spawn(async move {
            // The watcher stops delivering events once dropped.
            let _watcher = watcher;
            self.watch_loop(rx, &file_name, cancel_token).await;
        }))
    }

    async fn watch_loop(
        &self,
        mut rx: mpsc::UnboundedReceiver<notify::Result<FsEvent>>,
        file_name: &OsString,
        cancel_token: CancellationToken,
    ) {
        let mut state = WatchState::Idle;
        let mut deadline = Instant::now();

        loop {
            match state {
                WatchState::Idle => {
                    let event = tokio::select! {
                        () = cancel_token.cancelled() => break,
                        event = rx.recv() => event,
                    };
                    match event {
                        Some(Ok(event)) if touches(&event, file_name) => {
                            debug!("Config file modified: {:?}", event.paths);
                            deadline = Instant::now() + self.debounce;
                            state = WatchState::DebouncingWrite;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!("Watcher error: {e}"),
                        None => break,
                    }
                }
                WatchState::DebouncingWrite => {
                    tokio::select! {
                        () = cancel_token.cancelled() => break,
                        () = tokio::time::sleep_until(deadline) => {
                            state = WatchState::Reloading;
                        }
                        event = rx.recv() => match event {
                            // Only another write to the config file extends the quiet period.
                            Some(Ok(event)) if touches(&event, file_name) => {
                                deadline = Instant::now() + self.debounce;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => warn!("Watcher error: {e}"),
                            None => state = WatchState::Reloading,
                        },
                    }
                }
                WatchState::Reloading => {
                    // Failures are logged inside; the old config stays active.
                    let _ = reload_and_notify(&self.store, &self.bus, self.on_reload.as_deref());
                    state = WatchState::Idle;
                }
            }
        }

        info!("Config watcher stopped");
    }
}

/// Whether a file system event is a write to the watched file.
fn touches(event: &FsEvent, file_name: &OsString) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().map_err(HearthError::Io)?;
        Ok(cwd.join(path))
    }
}
