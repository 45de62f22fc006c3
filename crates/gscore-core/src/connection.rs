//! Connection handle shared between the transport and a session.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::error::{SendError, SendResult};

/// Handle to one live backend connection.
///
/// The transport owns the receiving half of the outbound channel and watches
/// the shutdown signal; everything else talks to the connection through this
/// handle. Once closed, a handle never reopens.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Backend id of this connection.
    pub id: String,
    /// Sender for outgoing frames.
    message_tx: mpsc::Sender<Vec<u8>>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Creates a new connection handle.
    pub fn new(
        id: impl Into<String>,
        message_tx: mpsc::Sender<Vec<u8>>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            id: id.into(),
            message_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Creates a handle together with the receiving end of its outbound channel.
    pub fn channel(id: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (message_tx, message_rx) = mpsc::channel(buffer.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        (Self::new(id, message_tx, shutdown_tx), message_rx)
    }

    /// Writes one frame to the connection.
    ///
    /// A send waiting on a full channel fails as soon as the connection is closed.
    pub async fn send(&self, data: Vec<u8>) -> SendResult<()> {
        if self.is_closed() {
            return Err(SendError::closed(&self.id));
        }

        let mut shutdown = self.subscribe();
        tokio::select! {
            biased;
            _ = async { let _ = shutdown.wait_for(|closed| *closed).await; } => {
                Err(SendError::closed(&self.id))
            }
            sent = self.message_tx.send(data) => sent.map_err(|_| SendError::closed(&self.id)),
        }
    }

    /// Returns whether the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow() || self.message_tx.is_closed()
    }

    /// Subscribes to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Closes this connection.
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_pending, assert_ready_err, task};

    #[tokio::test]
    async fn test_send_after_close_writes_nothing() {
        let (handle, mut rx) = ConnectionHandle::channel("bot", 4);
        handle.send(b"one".to_vec()).await.unwrap();
        handle.close();

        let err = assert_err!(handle.send(b"two".to_vec()).await);
        assert!(matches!(err, SendError::ConnectionClosed { ref bot_id } if bot_id == "bot"));
        assert_eq!(rx.recv().await.unwrap(), b"one".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_counts_as_closed() {
        let (handle, rx) = ConnectionHandle::channel("bot", 1);
        drop(rx);
        assert!(handle.is_closed());
        assert!(handle.send(vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn test_close_notifies_subscribers() {
        let (handle, _rx) = ConnectionHandle::channel("bot", 1);
        let mut shutdown = handle.subscribe();
        handle.close();
        shutdown.changed().await.unwrap();
        assert!(*shutdown.borrow());
    }

    #[test]
    fn test_close_fails_send_blocked_on_full_channel() {
        let (handle, _rx) = ConnectionHandle::channel("bot", 1);
        let mut first = task::spawn(handle.send(vec![1]));
        assert!(first.poll().is_ready());

        let mut blocked = task::spawn(handle.send(vec![2]));
        assert_pending!(blocked.poll());

        handle.close();
        assert!(blocked.is_woken());
        let err = assert_ready_err!(blocked.poll());
        assert!(matches!(err, SendError::ConnectionClosed { .. }));
    }
}
