use crate::schema::OverrideFile;
use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format as _, Yaml},
};
use gatesync_types::ClientAccessDto;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;

/// Watches the access-override file and hot-reloads it on modification.
///
/// The current override list is published through an `ArcSwap` so readers
/// always see a complete parse; a change notification is additionally sent
/// over a channel so the refresh coordinator can re-apply the overrides to
/// the cached configs. A file that fails to parse keeps the current list.
pub struct OverrideWatcher {
    /// Current override entries, atomically swappable.
    current: Arc<ArcSwap<Vec<ClientAccessDto>>>,
    /// Path to the override file.
    path: PathBuf,
    /// Signals the coordinator that `current` changed.
    changed_tx: mpsc::UnboundedSender<()>,
}

impl OverrideWatcher {
    /// Creates a new watcher from a file path, loading the initial override
    /// list immediately.
    ///
    /// Returns the watcher and the receiver for change notifications.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the override file cannot be read or
    /// parsed.
    #[allow(clippy::result_large_err)]
    pub fn new(path: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<()>), figment::Error> {
        let initial = load_override_file(&path)?;
        let (changed_tx, changed_rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                current: Arc::new(ArcSwap::from_pointee(initial)),
                path,
                changed_tx,
            },
            changed_rx,
        ))
    }

    /// Returns a snapshot of the current override entries.
    #[must_use]
    pub fn load(&self) -> Arc<Vec<ClientAccessDto>> {
        self.current.load_full()
    }

    /// Manually reloads the override file from disk and notifies listeners.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed;
    /// the current list is kept in that case.
    #[allow(clippy::result_large_err)]
    pub fn reload(&self) -> Result<(), figment::Error> {
        let entries = load_override_file(&self.path)?;
        self.current.store(Arc::new(entries));
        let _ = self.changed_tx.send(());
        Ok(())
    }

    /// Starts background file watching (spawns a blocking task) that
    /// automatically reloads the override list when the file changes.
    ///
    /// # Panics
    ///
    /// Panics if the OS file watcher cannot be created or the override file
    /// path cannot be registered for watching.
    pub fn watch(self: Arc<Self>) {
        use notify::{RecursiveMode, Watcher as _};
        let watcher_self = Arc::clone(&self);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut watcher =
                notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                    if res.is_ok() {
                        let _ = tx.send(());
                    }
                })
                .expect("failed to create watcher");

            watcher
                .watch(&path, RecursiveMode::NonRecursive)
                .expect("failed to watch override file");

            for () in rx {
                if let Err(e) = watcher_self.reload() {
                    tracing::error!(
                        path = %watcher_self.path.display(),
                        error = %e,
                        "override reload failed, keeping current entries"
                    );
                }
            }
        });
    }
}

#[allow(clippy::result_large_err)]
fn load_override_file(path: &std::path::Path) -> Result<Vec<ClientAccessDto>, figment::Error> {
    let parsed: OverrideFile = Figment::new().merge(Yaml::file(path)).extract()?;
    Ok(parsed.overrides)
}
