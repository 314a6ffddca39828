//! Presence notices broadcast on membership changes.

use crate::registry::ConnectionId;
use crate::sink::Outbound;
use geochat_protocol::ServerFrame;
use std::sync::Arc;

/// A membership change worth telling a channel about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// A connection arrived in the channel.
    Joined,
    /// A connection left the channel or disconnected.
    Left,
}

impl PresenceChange {
    /// Human-readable notice text for `who`.
    #[must_use]
    pub fn notice(self, who: &ConnectionId) -> String {
        match self {
            PresenceChange::Joined => format!("{who} joined the chat"),
            PresenceChange::Left => format!("{who} left the chat"),
        }
    }

    /// The shared outbound frame for this change.
    #[must_use]
    pub fn frame(self, who: &ConnectionId) -> Outbound {
        let notice = self.notice(who);
        Arc::new(match self {
            PresenceChange::Joined => ServerFrame::user_joined(notice),
            PresenceChange::Left => ServerFrame::user_left(notice),
        })
    }
}
