use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable, one-shot cancellation signal
///
/// Every clone observes the same signal. Once triggered it stays triggered.
#[derive(Clone, Debug)]
pub struct Interrupt(Arc<watch::Sender<bool>>);

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(Arc::new(tx))
    }

    /// Signal every holder of this interrupt
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    /// Wait until the interrupt is triggered
    ///
    /// Returns immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.0.subscribe();
        // the sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}
