//! Live connections and the channel each one currently belongs to.

use crate::channel::ChannelId;
use crate::error::{consistency_failure, RouterError};
use crate::sink::PeerSink;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Disambiguates ids generated within the same clock tick.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How long a departed id is still recognized as having been connected.
const DEPARTED_TTL: Duration = Duration::from_secs(60);

/// Tombstone count above which expired ones are swept on unregister.
const DEPARTED_SWEEP_AT: usize = 1024;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID. Never repeats within a process.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{timestamp:x}_{counter:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Mutable per-connection state, guarded by the entry's mutex.
///
/// Every router operation on a connection holds this lock for its whole
/// duration, so a location update can never interleave with the teardown of
/// the same connection. Lock order is always connection, then channel(s).
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    channel: Option<ChannelId>,
    closed: bool,
}

impl ConnectionState {
    pub(crate) fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Record the channel the connection was just moved into.
    ///
    /// Only valid right after `ChannelTable::move_connection` succeeded under
    /// this same lock.
    pub(crate) fn set_channel(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    pub(crate) fn take_channel(&mut self) -> Option<ChannelId> {
        self.channel.take()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }
}

/// A registered connection.
pub(crate) struct ConnectionEntry {
    pub(crate) sink: Arc<dyn PeerSink>,
    pub(crate) state: Mutex<ConnectionState>,
}

/// Tracks `connection -> current channel` for every live connection.
///
/// Entries are handed out as `Arc`s so that no map guard is ever held while
/// a connection or channel lock is taken.
///
/// Unregistered ids leave a short-lived tombstone behind. A lookup racing a
/// teardown then sees a departed connection instead of one that never
/// existed.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
    departed: DashMap<ConnectionId, Instant>,
    /// Admitted connections, reserved before the map insert.
    admitted: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with no channel.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the id is live (debug builds panic).
    pub fn register(&self, id: ConnectionId, sink: Arc<dyn PeerSink>) -> Result<(), RouterError> {
        self.register_within(id, sink, usize::MAX)
    }

    /// Register a connection unless `limit` connections are already live.
    ///
    /// The limit check and the insert are one step: concurrent callers can
    /// never push the registry past `limit`.
    ///
    /// # Errors
    ///
    /// Returns `MaxConnectionsReached` when full, or `AlreadyRegistered` if
    /// the id is live (debug builds panic).
    pub fn register_within(
        &self,
        id: ConnectionId,
        sink: Arc<dyn PeerSink>,
        limit: usize,
    ) -> Result<(), RouterError> {
        if self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_err()
        {
            return Err(RouterError::MaxConnectionsReached);
        }

        match self.connections.entry(id) {
            Entry::Occupied(occupied) => {
                self.admitted.fetch_sub(1, Ordering::AcqRel);
                Err(consistency_failure(RouterError::AlreadyRegistered(
                    occupied.key().clone(),
                )))
            }
            Entry::Vacant(vacant) => {
                self.departed.remove(vacant.key());
                debug!(connection = %vacant.key(), "Connection registered");
                vacant.insert(Arc::new(ConnectionEntry {
                    sink,
                    state: Mutex::new(ConnectionState::default()),
                }));
                Ok(())
            }
        }
    }

    /// The channel `id` currently belongs to, if any.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if `id` was recently torn down and
    /// `UnknownConnection` if it was never registered (debug builds panic).
    pub fn current_channel(&self, id: &ConnectionId) -> Result<Option<ChannelId>, RouterError> {
        let entry = self.entry(id)?;
        let state = entry.state.lock();
        Ok(state.channel().map(str::to_owned))
    }

    /// Remove a connection. The caller must already have removed it from its
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConnection` if `id` is not registered (debug builds panic).
    pub fn unregister(&self, id: &ConnectionId) -> Result<(), RouterError> {
        if !self.connections.contains_key(id) {
            return Err(consistency_failure(RouterError::UnknownConnection(
                id.clone(),
            )));
        }

        // Tombstone first: the id is never absent from both maps.
        self.departed.insert(id.clone(), Instant::now());
        if self.connections.remove(id).is_none() {
            return Err(consistency_failure(RouterError::UnknownConnection(
                id.clone(),
            )));
        }
        self.admitted.fetch_sub(1, Ordering::AcqRel);
        debug!(connection = %id, "Connection unregistered");

        if self.departed.len() > DEPARTED_SWEEP_AT {
            self.departed
                .retain(|_, departed_at| departed_at.elapsed() < DEPARTED_TTL);
        }
        Ok(())
    }

    /// Check whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections that currently belong to a channel.
    #[must_use]
    pub fn joined_count(&self) -> usize {
        let entries: Vec<_> = self
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        entries
            .iter()
            .filter(|entry| entry.state.lock().channel().is_some())
            .count()
    }

    /// The delivery sink of `id`, or `None` if it has gone away.
    pub(crate) fn sink(&self, id: &ConnectionId) -> Option<Arc<dyn PeerSink>> {
        self.connections.get(id).map(|e| Arc::clone(&e.value().sink))
    }

    /// Look up the entry of a live connection.
    ///
    /// A recently departed id yields `Disconnected`. An id that was never
    /// registered is a consistency failure.
    pub(crate) fn entry(&self, id: &ConnectionId) -> Result<Arc<ConnectionEntry>, RouterError> {
        if let Some(entry) = self.connections.get(id) {
            return Ok(Arc::clone(entry.value()));
        }
        if self.departed.contains_key(id) {
            trace!(connection = %id, "Lookup of departed connection");
            return Err(RouterError::Disconnected(id.clone()));
        }
        Err(consistency_failure(RouterError::UnknownConnection(
            id.clone(),
        )))
    }
}
