//! Connect and disconnect hooks for the transport layer.

use crate::error::RouterError;
use crate::registry::ConnectionId;
use crate::router::{BroadcastRouter, Departure};
use crate::sink::PeerSink;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wires transport connect/disconnect signals into the router.
///
/// Transports may report the end of a connection more than once (read error
/// followed by a close, for example). Cleanup runs for the first report only.
#[derive(Clone)]
pub struct ConnectionLifecycleManager {
    router: Arc<BroadcastRouter>,
}

impl ConnectionLifecycleManager {
    /// Create a lifecycle manager for `router`.
    #[must_use]
    pub fn new(router: Arc<BroadcastRouter>) -> Self {
        Self { router }
    }

    /// The router this manager feeds.
    #[must_use]
    pub fn router(&self) -> &Arc<BroadcastRouter> {
        &self.router
    }

    /// Register a new connection under a generated id.
    ///
    /// # Errors
    ///
    /// Returns `MaxConnectionsReached` when the router is full.
    pub fn connect(&self, sink: Arc<dyn PeerSink>) -> Result<ConnectionId, RouterError> {
        let id = ConnectionId::generate();
        self.attach(id.clone(), sink)?;
        Ok(id)
    }

    /// Register a new connection under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `MaxConnectionsReached` when the router is full, or
    /// `AlreadyRegistered` if `id` is live.
    pub fn attach(&self, id: ConnectionId, sink: Arc<dyn PeerSink>) -> Result<(), RouterError> {
        match self.router.register(id.clone(), sink) {
            Ok(()) => {
                debug!(connection = %id, "Connection attached");
                Ok(())
            }
            Err(RouterError::MaxConnectionsReached) => {
                warn!(connection = %id, "Connection refused: limit reached");
                Err(RouterError::MaxConnectionsReached)
            }
            Err(e) => Err(e),
        }
    }

    /// Tear a connection down. Safe to call any number of times.
    ///
    /// Returns the departure for the call that performed the cleanup, `None`
    /// for every other call.
    pub fn disconnect(&self, id: &ConnectionId) -> Option<Departure> {
        self.router.on_disconnect(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::router::RouterConfig;
    use crate::sink::outbound_queue;
    use geochat_protocol::ServerFrame;
    use std::thread;

    fn manager(max_connections: usize) -> ConnectionLifecycleManager {
        let router = BroadcastRouter::with_config(RouterConfig {
            max_connections,
            ..RouterConfig::default()
        })
        .unwrap();
        ConnectionLifecycleManager::new(Arc::new(router))
    }

    #[test]
    fn test_connect_registers_without_channel() {
        let lifecycle = manager(10);
        let (sink, _rx) = outbound_queue(8);

        let id = lifecycle.connect(sink).unwrap();
        assert!(lifecycle.router().registry().contains(&id));
        assert_eq!(lifecycle.router().current_channel(&id), Ok(None));
    }

    #[test]
    fn test_connection_limit() {
        let lifecycle = manager(1);
        let (first, _rx1) = outbound_queue(8);
        let (second, _rx2) = outbound_queue(8);

        let id = lifecycle.connect(first).unwrap();
        assert_eq!(
            lifecycle.connect(second.clone()),
            Err(RouterError::MaxConnectionsReached)
        );

        lifecycle.disconnect(&id);
        assert!(lifecycle.connect(second).is_ok());
    }

    #[test]
    fn test_concurrent_connects_respect_limit() {
        let lifecycle = manager(5);
        let (sink, _rx) = outbound_queue(8);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    (0..4)
                        .filter(|_| lifecycle.connect(Arc::clone(&sink)).is_ok())
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 5);
        assert_eq!(lifecycle.router().registry().len(), 5);
    }

    #[test]
    fn test_repeated_disconnect_notifies_once() {
        let lifecycle = manager(10);
        let (sink_a, mut rx_a) = outbound_queue(8);
        let (sink_b, _rx_b) = outbound_queue(8);
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        lifecycle.attach(a.clone(), sink_a).unwrap();
        lifecycle.attach(b.clone(), sink_b).unwrap();

        let here = Coordinate::new(51.5074, -0.1278).unwrap();
        lifecycle.router().on_location_update(&a, here).unwrap();
        lifecycle.router().on_location_update(&b, here).unwrap();
        assert!(rx_a.try_recv().is_ok());

        assert_eq!(lifecycle.disconnect(&b).map(|d| d.notified), Some(1));
        assert!(lifecycle.disconnect(&b).is_none());
        assert!(lifecycle.disconnect(&b).is_none());

        assert_eq!(
            *rx_a.try_recv().unwrap(),
            ServerFrame::user_left("b left the chat")
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_before_join_just_unregisters() {
        let lifecycle = manager(10);
        let (sink, _rx) = outbound_queue(8);
        let id = lifecycle.connect(sink).unwrap();

        let departure = lifecycle.disconnect(&id).unwrap();
        assert_eq!(departure.channel, None);
        assert_eq!(departure.notified, 0);
        assert!(lifecycle.router().registry().is_empty());
    }

    #[test]
    fn test_concurrent_teardown_signals() {
        let lifecycle = manager(10);
        let (sink_a, _rx_a) = outbound_queue(8);
        let (sink_b, mut rx_b) = outbound_queue(8);
        let a = ConnectionId::new("a");
        lifecycle.attach(a.clone(), sink_a).unwrap();
        lifecycle.attach(ConnectionId::new("b"), sink_b).unwrap();
        let here = Coordinate::new(1.0, 1.0).unwrap();
        lifecycle.router().on_location_update(&ConnectionId::new("b"), here).unwrap();
        lifecycle.router().on_location_update(&a, here).unwrap();
        assert!(rx_b.try_recv().is_ok());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let a = a.clone();
                thread::spawn(move || lifecycle.disconnect(&a).is_some())
            })
            .collect();
        let performed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|done| *done)
            .count();

        assert_eq!(performed, 1);
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
