//! Process-wide registry of stream-cancellation handles.

use std::sync::Arc;

use tokio::sync::watch;

/// Every long-lived stream subscribes; [`ShutdownRegistry::shutdown`] fires
/// exactly once and terminates them all. Streams created after shutdown see
/// the flag immediately.
#[derive(Clone)]
pub struct ShutdownRegistry {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.subscribe().borrow()
    }
}

impl Default for ShutdownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_reaches_every_registered_stream() {
        let registry = ShutdownRegistry::new();
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();

        registry.shutdown();

        tokio::time::timeout(Duration::from_secs(1), first.changed())
            .await
            .expect("first notified")
            .expect("sender alive");
        tokio::time::timeout(Duration::from_secs(1), second.changed())
            .await
            .expect("second notified")
            .expect("sender alive");
        assert!(registry.is_shutdown());
    }

    #[test]
    fn late_subscribers_observe_the_flag() {
        let registry = ShutdownRegistry::new();
        registry.shutdown();
        assert!(*registry.subscribe().borrow());
    }
}
