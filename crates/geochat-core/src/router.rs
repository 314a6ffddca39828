//! Broadcast router for geo channels.
//!
//! The router ties the grid, the connection registry and the channel table
//! together. It moves connections between channels on location updates,
//! fans chat messages out to channel peers, and synthesizes presence notices.

use crate::channel::{ChannelId, ChannelTable};
use crate::error::RouterError;
use crate::geo::{Coordinate, GeoError, GeoGrid, DEFAULT_PRECISION};
use crate::message::ChatMessage;
use crate::presence::PresenceChange;
use crate::registry::{ConnectionEntry, ConnectionId, ConnectionRegistry};
use crate::sink::{Outbound, PeerSink};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Decimal places kept in grid keys.
    pub precision: u32,
    /// Also send "user-left" to the previous channel when a connection
    /// relocates. Off by default: a relocation only announces the arrival.
    pub announce_relocation: bool,
    /// Maximum number of registered connections.
    pub max_connections: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            announce_relocation: false,
            max_connections: 100_000,
        }
    }
}

/// Outcome of a location update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationUpdate {
    /// Channel the connection is now in.
    pub channel: ChannelId,
    /// `false` when the update mapped to the channel it was already in.
    pub changed: bool,
    /// Number of "user-joined" notices delivered.
    pub notified: usize,
}

/// Outcome of a disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Channel the connection left, if it had joined one.
    pub channel: Option<ChannelId>,
    /// Number of "user-left" notices delivered.
    pub notified: usize,
}

/// Router statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStats {
    /// Number of live channels.
    pub channel_count: usize,
    /// Number of registered connections.
    pub connection_count: usize,
    /// Connections that have joined a channel.
    pub joined_count: usize,
}

/// Routes location updates, chat messages and disconnects.
///
/// Construct one per service and share it behind an `Arc`; every instance
/// is fully isolated.
pub struct BroadcastRouter {
    registry: ConnectionRegistry,
    table: ChannelTable,
    grid: GeoGrid,
    config: RouterConfig,
}

impl BroadcastRouter {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            table: ChannelTable::new(),
            grid: GeoGrid::default(),
            config: RouterConfig::default(),
        }
    }

    /// Create a router with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured grid precision is unsupported.
    pub fn with_config(config: RouterConfig) -> Result<Self, GeoError> {
        info!("Creating router with config: {:?}", config);
        Ok(Self {
            registry: ConnectionRegistry::new(),
            table: ChannelTable::new(),
            grid: GeoGrid::new(config.precision)?,
            config,
        })
    }

    /// Router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The grid used to key channels.
    #[must_use]
    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The channel table.
    #[must_use]
    pub fn table(&self) -> &ChannelTable {
        &self.table
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            channel_count: self.table.len(),
            connection_count: self.registry.len(),
            joined_count: self.registry.joined_count(),
        }
    }

    /// Register a connection that has not reported a location yet.
    ///
    /// # Errors
    ///
    /// Returns `MaxConnectionsReached` once [`RouterConfig::max_connections`]
    /// connections are live, or an error if the id is already registered.
    pub fn register(&self, id: ConnectionId, sink: Arc<dyn PeerSink>) -> Result<(), RouterError> {
        self.registry
            .register_within(id, sink, self.config.max_connections)
    }

    /// The channel a connection currently belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the connection was torn down, or an error
    /// if it is unknown.
    pub fn current_channel(&self, id: &ConnectionId) -> Result<Option<ChannelId>, RouterError> {
        self.registry.current_channel(id)
    }

    /// Handle a location report: move the connection into the channel for
    /// `coord` and greet the channel's existing members.
    ///
    /// An update that maps to the current channel changes nothing and sends
    /// nothing. Relocating does not notify the previous channel unless
    /// [`RouterConfig::announce_relocation`] is set.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the connection is being or has been torn
    /// down, or an error if it is unknown.
    pub fn on_location_update(
        &self,
        id: &ConnectionId,
        coord: Coordinate,
    ) -> Result<LocationUpdate, RouterError> {
        let entry = self.registry.entry(id)?;
        let mut state = entry.state.lock();
        if state.is_closed() {
            trace!(connection = %id, "Location update during teardown");
            return Err(RouterError::Disconnected(id.clone()));
        }

        let channel = self.grid.key(&coord);
        let previous = state.channel().map(str::to_owned);
        let mv = self
            .table
            .move_connection(id, previous.as_deref(), &channel);

        if !mv.changed {
            return Ok(LocationUpdate {
                channel,
                changed: false,
                notified: 0,
            });
        }
        state.set_channel(channel.clone());

        let notified = if mv.joined_new_channel {
            0
        } else {
            self.deliver(&mv.peers, &PresenceChange::Joined.frame(id))
        };

        if self.config.announce_relocation && !mv.left_behind.is_empty() {
            self.deliver(&mv.left_behind, &PresenceChange::Left.frame(id));
        }

        debug!(
            connection = %id,
            from = ?previous,
            channel = %channel,
            notified,
            "Joined channel"
        );

        Ok(LocationUpdate {
            channel,
            changed: true,
            notified,
        })
    }

    /// Deliver a chat message to every other member of the sender's channel.
    ///
    /// Returns the number of recipients the message was queued for. Messages
    /// from one sender reach each recipient in the order they were sent.
    ///
    /// # Errors
    ///
    /// Returns `EmptyMessage` for a blank body, `NotJoined` if the sender
    /// has not reported a location yet, and `Disconnected` if the sender is
    /// being or has been torn down.
    pub fn on_chat_message(&self, id: &ConnectionId, body: &str) -> Result<usize, RouterError> {
        if body.trim().is_empty() {
            return Err(RouterError::EmptyMessage);
        }

        let entry = self.registry.entry(id)?;
        // Held across fan-out so one sender's messages are queued in order.
        let state = entry.state.lock();
        if state.is_closed() {
            return Err(RouterError::Disconnected(id.clone()));
        }
        let Some(channel) = state.channel() else {
            debug!(connection = %id, "Chat message before join");
            return Err(RouterError::NotJoined(id.clone()));
        };

        let recipients = self.table.members_of(channel, Some(id));
        let message = ChatMessage::new(id.clone(), channel, body);
        let delivered = self.deliver(&recipients, &Arc::new(message.to_frame()));

        trace!(
            message = message.id,
            connection = %id,
            channel = %message.channel,
            recipients = recipients.len(),
            delivered,
            "Chat message routed"
        );

        Ok(delivered)
    }

    /// Remove a connection from its channel, tell the remaining members, and
    /// unregister it.
    ///
    /// Safe to call any number of times: only the first call for a connection
    /// performs the cleanup and returns its departure. Later calls, and calls
    /// racing that one, return `None`. An id that was never registered is a
    /// consistency failure (debug builds panic) and also yields `None`.
    pub fn on_disconnect(&self, id: &ConnectionId) -> Option<Departure> {
        let entry = match self.registry.entry(id) {
            Ok(entry) => entry,
            Err(RouterError::Disconnected(_)) => {
                trace!(connection = %id, "Disconnect for connection already gone");
                return None;
            }
            Err(_) => return None,
        };
        self.teardown(id, &entry)
    }

    fn teardown(&self, id: &ConnectionId, entry: &ConnectionEntry) -> Option<Departure> {
        let mut state = entry.state.lock();
        if state.is_closed() {
            return None;
        }
        state.close();

        let channel = state.take_channel();
        let notified = match channel.as_deref() {
            Some(ch) => match self.table.leave(id, ch) {
                Some(remaining) => self.deliver(&remaining, &PresenceChange::Left.frame(id)),
                None => {
                    warn!(connection = %id, channel = %ch, "Connection missing from its channel");
                    0
                }
            },
            None => 0,
        };

        // The closed flag keeps every other teardown of this id out.
        if let Err(e) = self.registry.unregister(id) {
            warn!(connection = %id, error = %e, "Unregister failed");
        }

        debug!(connection = %id, channel = ?channel, notified, "Connection departed");

        Some(Departure { channel, notified })
    }

    /// Queue `frame` for each target. Failures are logged per recipient and
    /// never abort the rest of the fan-out.
    fn deliver(&self, targets: &[ConnectionId], frame: &Outbound) -> usize {
        let mut delivered = 0;
        for target in targets {
            let Some(sink) = self.registry.sink(target) else {
                trace!(connection = %target, "Recipient already gone");
                continue;
            };
            match sink.deliver(Arc::clone(frame)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection = %target, event = %frame.event(), error = %e, "Delivery failed");
                }
            }
        }
        delivered
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new()
    }
}
