//! Shared fixtures for the GeoChat benchmarks.

use geochat_core::{outbound_queue, BroadcastRouter, ConnectionId, Coordinate, Outbound};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound queue depth used by fixtures.
pub const QUEUE_CAPACITY: usize = 1024;

/// A router with `members` connections joined to one channel.
pub struct Crowd {
    pub router: Arc<BroadcastRouter>,
    pub members: Vec<ConnectionId>,
    outboxes: Vec<mpsc::Receiver<Outbound>>,
}

impl Crowd {
    /// Register `size` connections and move them all to `at`.
    ///
    /// # Panics
    ///
    /// Panics if registration or the location update fails.
    #[must_use]
    pub fn gather(size: usize, at: Coordinate) -> Self {
        let router = Arc::new(BroadcastRouter::new());
        let mut members = Vec::with_capacity(size);
        let mut outboxes = Vec::with_capacity(size);

        for i in 0..size {
            let id = ConnectionId::new(format!("bench-{i}"));
            let (sink, rx) = outbound_queue(QUEUE_CAPACITY);
            router.register(id.clone(), sink).expect("register");
            router.on_location_update(&id, at).expect("join");
            members.push(id);
            outboxes.push(rx);
        }

        let mut crowd = Self {
            router,
            members,
            outboxes,
        };
        crowd.drain();
        crowd
    }

    /// Discard every queued frame. Returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for rx in &mut self.outboxes {
            while rx.try_recv().is_ok() {
                drained += 1;
            }
        }
        drained
    }
}
