//! # geochat-core
//!
//! Channel membership and broadcast routing for the GeoChat service.
//!
//! Clients are bucketed into chat channels by a coarse grid over their
//! coordinates. This crate provides:
//!
//! - **Geo** - Validated coordinates and grid keys
//! - **Registry** - Live connections and their current channel
//! - **Channel** - Channel membership with atomic moves
//! - **Router** - Location updates, chat fan-out and presence notices
//! - **Lifecycle** - Connect/disconnect hooks for the transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  Lifecycle  │────▶│   Router    │────▶│ ChannelTable │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                        │       │
//!                        ▼       ▼
//!                 ┌──────────┐ ┌──────────┐
//!                 │ GeoGrid  │ │ Registry │──▶ PeerSink
//!                 └──────────┘ └──────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use geochat_core::{outbound_queue, BroadcastRouter, ConnectionLifecycleManager, Coordinate};
//!
//! let lifecycle = ConnectionLifecycleManager::new(Arc::new(BroadcastRouter::new()));
//! let (sink, _outbox) = outbound_queue(64);
//! let id = lifecycle.connect(sink).unwrap();
//!
//! let here = Coordinate::new(37.7749, -122.4194).unwrap();
//! let update = lifecycle.router().on_location_update(&id, here).unwrap();
//! assert_eq!(update.channel, "37.775:-122.419");
//!
//! lifecycle.disconnect(&id);
//! ```

pub mod channel;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod message;
pub mod presence;
pub mod registry;
pub mod router;
pub mod sink;

pub use channel::{ChannelId, ChannelTable, Move};
pub use error::RouterError;
pub use geo::{Coordinate, GeoError, GeoGrid, GridCell};
pub use lifecycle::ConnectionLifecycleManager;
pub use message::ChatMessage;
pub use presence::PresenceChange;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use router::{BroadcastRouter, Departure, LocationUpdate, RouterConfig, RouterStats};
pub use sink::{outbound_queue, DeliveryError, Outbound, PeerSink};
