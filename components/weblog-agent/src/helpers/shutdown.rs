// External crates
use tokio::sync::broadcast;
use tracing::instrument;

/// Process-wide shutdown signal on top of a broadcast channel.
///
/// The collection loop and the Ctrl-C listener each hold a clone; any
/// holder can `trigger()` and every `subscribe()`d receiver observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Only one message is ever sent, so a tiny buffer is enough.
    #[instrument(name = "weblog_shutdown_channel", target = "helpers::shutdown", level = "trace")]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    #[instrument(name = "weblog_shutdown_subscriber", target = "helpers::shutdown", level = "trace", skip_all)]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    #[instrument(name = "weblog_shutdown_trigger", target = "helpers::shutdown", level = "trace", skip_all)]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered");
        let _ = self.tx.send(());
    }

    /// Resolve on `trigger()` or on SIGINT, whichever happens first.
    /// Ctrl-C re-broadcasts so other subscribers see it too.
    pub async fn wait_for_signal(&self) {
        let mut rx = self.subscribe();
        tokio::select! {
            _ = rx.recv() => {}
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
                    Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
                }
                self.trigger();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_subscriber_sees_the_trigger() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.clone().subscribe();

        shutdown.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn wait_returns_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_signal().await })
        };

        // Let the waiter subscribe before triggering.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
