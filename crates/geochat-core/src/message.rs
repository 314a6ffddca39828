//! Chat messages in flight.
//!
//! A message lives only for the duration of one broadcast; nothing here is
//! stored.

use crate::channel::ChannelId;
use crate::registry::ConnectionId;
use geochat_protocol::ServerFrame;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique message identifier, used for log correlation.
pub type MessageId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A chat message on its way to the sender's channel peers.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Sending connection.
    pub sender: ConnectionId,
    /// Channel the sender belonged to at send time.
    pub channel: ChannelId,
    /// Message body.
    pub body: String,
}

impl ChatMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(sender: ConnectionId, channel: impl Into<ChannelId>, body: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            sender,
            channel: channel.into(),
            body: body.into(),
        }
    }

    /// The outbound frame delivered to each recipient.
    #[must_use]
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::chat_message(self.sender.as_str(), self.body.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame() {
        let msg = ChatMessage::new(ConnectionId::new("conn-a"), "1.000:2.000", "hi");
        assert_eq!(msg.to_frame(), ServerFrame::chat_message("conn-a", "hi"));
        assert_eq!(msg.channel, "1.000:2.000");
    }

    #[test]
    fn test_unique_message_ids() {
        let a = ChatMessage::new(ConnectionId::new("x"), "c", "1");
        let b = ChatMessage::new(ConnectionId::new("x"), "c", "2");
        assert!(b.id > a.id);
    }
}
