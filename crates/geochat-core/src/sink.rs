//! Outbound delivery to connected peers.
//!
//! The router never writes to a transport directly. Each connection registers
//! a [`PeerSink`] that accepts frames without blocking; the transport task on
//! the other side drains it at its own pace.

use geochat_protocol::ServerFrame;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A frame shared between all recipients of one broadcast.
pub type Outbound = Arc<ServerFrame>;

/// Default capacity of a per-connection outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Per-recipient delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient's queue is full; the frame was dropped.
    #[error("Outbound queue is full")]
    Full,

    /// The recipient's transport task has gone away.
    #[error("Outbound queue is closed")]
    Closed,
}

/// Non-blocking handle used to push frames to one connection.
pub trait PeerSink: Send + Sync {
    /// Queue a frame for delivery. Must not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be queued.
    fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError>;
}

impl PeerSink for mpsc::Sender<Outbound> {
    fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl PeerSink for mpsc::UnboundedSender<Outbound> {
    fn deliver(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.send(frame).map_err(|_| DeliveryError::Closed)
    }
}

/// Create a bounded outbound queue for one connection.
#[must_use]
pub fn outbound_queue(capacity: usize) -> (Arc<dyn PeerSink>, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Arc::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_sink_full() {
        let (sink, mut rx) = outbound_queue(1);
        let frame: Outbound = Arc::new(ServerFrame::user_joined("a"));

        assert_eq!(sink.deliver(frame.clone()), Ok(()));
        assert_eq!(sink.deliver(frame.clone()), Err(DeliveryError::Full));

        assert!(rx.try_recv().is_ok());
        assert_eq!(sink.deliver(frame), Ok(()));
    }

    #[test]
    fn test_sink_closed() {
        let (sink, rx) = outbound_queue(4);
        drop(rx);
        assert_eq!(
            sink.deliver(Arc::new(ServerFrame::user_left("a"))),
            Err(DeliveryError::Closed)
        );

        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        drop(rx);
        assert_eq!(
            tx.deliver(Arc::new(ServerFrame::user_left("a"))),
            Err(DeliveryError::Closed)
        );
    }
}
