use tokio::sync::watch;

/// One-shot shutdown signal shared between a component and its background tasks.
///
/// Once triggered it stays triggered, so late waiters return immediately.
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
        }
    }

    /// trigger the signal, returns false if it was already triggered
    pub fn shutdown(&self) -> bool {
        !self.sender.send_replace(true)
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// wait until the signal is triggered
    pub async fn wait(&self) {
        let mut rx = self.sender.subscribe();
        let _ = rx.wait_for(|down| *down).await;
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::Shutdown;

    #[tokio::test]
    async fn test_wait_after_shutdown_returns() {
        let shutdown = Shutdown::new();
        assert!(shutdown.shutdown());
        assert!(!shutdown.shutdown());
        assert!(shutdown.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_on_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::task::yield_now().await;
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_millis(500), waiter).await.unwrap().unwrap();
    }
}
