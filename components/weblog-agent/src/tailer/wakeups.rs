// External crates
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::Path;
use tokio::sync::mpsc;

/// Filesystem change notifications for the directory holding the tailed
/// file. Bursts of events collapse into a single pending wakeup.
pub struct FsWakeups {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl FsWakeups {
    pub fn watch(path: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel::<()>(1);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if res.is_ok() {
                    let _ = tx.try_send(());
                }
            },
            notify::Config::default(),
        )?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Resolves on the next change. `None` once the watcher is gone.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}
