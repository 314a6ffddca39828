//! Event frames for the GeoChat protocol.
//!
//! Every frame is a named event with a payload, serialized as
//! `{"event": "<name>", "data": <payload>}`. Inbound and outbound events are
//! separate types because the same event name (`chat-message`) carries a
//! different payload in each direction.

use serde::{Deserialize, Serialize};

/// Event names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    JoinRoom,
    ChatMessage,
    UserJoined,
    UserLeft,
    Connected,
    Error,
    Ping,
    Pong,
}

impl EventName {
    /// The event name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventName::JoinRoom => "join-room",
            EventName::ChatMessage => "chat-message",
            EventName::UserJoined => "user-joined",
            EventName::UserLeft => "user-left",
            EventName::Connected => "connected",
            EventName::Error => "error",
            EventName::Ping => "ping",
            EventName::Pong => "pong",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location payload of a `join-room` event.
///
/// Older clients send only a bare latitude number. Those are accepted and
/// bucketed with a longitude of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    /// Full position.
    Point {
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// Latitude only.
    Latitude(f64),
}

impl Location {
    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        match *self {
            Location::Point { latitude, .. } | Location::Latitude(latitude) => latitude,
        }
    }

    /// Longitude in degrees (zero for latitude-only payloads).
    #[must_use]
    pub fn longitude(&self) -> f64 {
        match *self {
            Location::Point { longitude, .. } => longitude,
            Location::Latitude(_) => 0.0,
        }
    }
}

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    /// Report the client's position; moves it into the matching channel.
    #[serde(rename = "join-room")]
    JoinRoom(Location),

    /// Send a chat message to the client's current channel.
    #[serde(rename = "chat-message")]
    ChatMessage(String),

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp, echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientFrame {
    /// Get the event name.
    #[must_use]
    pub fn event(&self) -> EventName {
        match self {
            ClientFrame::JoinRoom(_) => EventName::JoinRoom,
            ClientFrame::ChatMessage(_) => EventName::ChatMessage,
            ClientFrame::Ping { .. } => EventName::Ping,
        }
    }

    /// Create a `join-room` frame for a full position.
    #[must_use]
    pub fn join_room(latitude: f64, longitude: f64) -> Self {
        ClientFrame::JoinRoom(Location::Point {
            latitude,
            longitude,
        })
    }

    /// Create a `chat-message` frame.
    #[must_use]
    pub fn chat_message(body: impl Into<String>) -> Self {
        ClientFrame::ChatMessage(body.into())
    }
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    /// Connection established.
    #[serde(rename = "connected")]
    Connected {
        /// Identifier assigned to this connection.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: String,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A chat message from a channel peer.
    #[serde(rename = "chat-message")]
    ChatMessage {
        /// Connection that sent the message.
        sender: String,
        /// Message body.
        message: String,
    },

    /// Someone joined the recipient's channel.
    #[serde(rename = "user-joined")]
    UserJoined(String),

    /// Someone left the recipient's channel.
    #[serde(rename = "user-left")]
    UserLeft(String),

    /// A request from this client was rejected.
    #[serde(rename = "error")]
    Error {
        /// Error code, see [`crate::error_codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerFrame {
    /// Get the event name.
    #[must_use]
    pub fn event(&self) -> EventName {
        match self {
            ServerFrame::Connected { .. } => EventName::Connected,
            ServerFrame::ChatMessage { .. } => EventName::ChatMessage,
            ServerFrame::UserJoined(_) => EventName::UserJoined,
            ServerFrame::UserLeft(_) => EventName::UserLeft,
            ServerFrame::Error { .. } => EventName::Error,
            ServerFrame::Pong { .. } => EventName::Pong,
        }
    }

    /// Create a `connected` frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        ServerFrame::Connected {
            connection_id: connection_id.into(),
            version: crate::PROTOCOL_VERSION.to_string(),
            heartbeat,
        }
    }

    /// Create a `chat-message` frame.
    #[must_use]
    pub fn chat_message(sender: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::ChatMessage {
            sender: sender.into(),
            message: message.into(),
        }
    }

    /// Create a `user-joined` frame.
    #[must_use]
    pub fn user_joined(notice: impl Into<String>) -> Self {
        ServerFrame::UserJoined(notice.into())
    }

    /// Create a `user-left` frame.
    #[must_use]
    pub fn user_left(notice: impl Into<String>) -> Self {
        ServerFrame::UserLeft(notice.into())
    }

    /// Create an `error` frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a `pong` frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerFrame::Pong { timestamp }
    }
}
