//! Shutdown signalling for the poll loop.
//!
//! Shutdown is only observed between poll cycles. A cycle that is draining always runs to
//! completion, so claimed entries are never abandoned half-applied.

use tokio::sync::watch;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<bool>;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown. Returns an error if every receiver is gone.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receivers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        assert!(!*rx.borrow());

        tx.shutdown().unwrap();
        rx.changed().await.unwrap();

        assert!(*rx.borrow());
        assert!(*tx.subscribe().borrow());
    }
}
