//! Channel membership table.
//!
//! Each channel is a set of connections guarded by its own mutex. A channel
//! exists only while it has members: the last leaver removes it from the
//! table and marks it retired, so anyone still holding a handle to it knows
//! to look the channel up again.

use crate::registry::ConnectionId;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// A channel identifier (`"<lat>:<lon>"` grid key).
pub type ChannelId = String;

#[derive(Debug)]
struct Channel {
    members: HashSet<ConnectionId>,
    retired: bool,
}

impl Channel {
    fn new() -> Self {
        Self {
            members: HashSet::new(),
            retired: false,
        }
    }

    fn others(&self, excluding: Option<&ConnectionId>) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|member| Some(*member) != excluding)
            .cloned()
            .collect()
    }
}

type Slot = Arc<Mutex<Channel>>;

/// Result of [`ChannelTable::move_connection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Move {
    /// `false` when source and destination were the same channel.
    pub changed: bool,
    /// The destination had no members before this move.
    pub joined_new_channel: bool,
    /// Other members of the destination at the moment of insertion.
    pub peers: Vec<ConnectionId>,
    /// Members remaining in the source channel after removal.
    pub left_behind: Vec<ConnectionId>,
}

/// Maps channel identifiers to their member connections.
#[derive(Default)]
pub struct ChannelTable {
    channels: DashMap<ChannelId, Slot>,
}

impl ChannelTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Option<Slot> {
        self.channels.get(id).map(|e| Arc::clone(e.value()))
    }

    fn slot_or_create(&self, id: &str) -> Slot {
        let entry = self.channels.entry(id.to_string()).or_insert_with(|| {
            debug!(channel = %id, "Creating channel");
            Arc::new(Mutex::new(Channel::new()))
        });
        Arc::clone(entry.value())
    }

    /// Drop an emptied channel. Caller holds its lock.
    fn retire(&self, id: &str, slot: &Slot, channel: &mut Channel) {
        channel.retired = true;
        self.channels.remove_if(id, |_, current| Arc::ptr_eq(current, slot));
        debug!(channel = %id, "Deleted empty channel");
    }

    /// Move `connection` from `from` (if any) into `to`.
    ///
    /// Both channel locks are held for the whole transition, taken in lexical
    /// order of their ids, so no observer sees the connection in neither or
    /// both channels. `from == to` is a no-op.
    pub fn move_connection(
        &self,
        connection: &ConnectionId,
        from: Option<&str>,
        to: &str,
    ) -> Move {
        if from == Some(to) {
            trace!(connection = %connection, channel = %to, "Move within same channel");
            return Move::default();
        }

        loop {
            let to_slot = self.slot_or_create(to);
            let from_slot = from.and_then(|id| self.slot(id).map(|slot| (id, slot)));

            let (mut from_guard, mut to_guard) = lock_pair(
                from_slot.as_ref().map(|(id, slot)| (*id, slot)),
                (to, &to_slot),
            );

            if to_guard.retired {
                // Emptied and removed between lookup and lock.
                continue;
            }

            let mut left_behind = Vec::new();
            if let (Some((from_id, slot)), Some(guard)) = (from_slot.as_ref(), from_guard.as_mut()) {
                if guard.members.remove(connection) {
                    if guard.members.is_empty() {
                        self.retire(from_id, slot, guard);
                    } else {
                        left_behind = guard.others(None);
                    }
                }
            }

            let joined_new_channel = to_guard.members.is_empty();
            let peers = to_guard.others(None);
            to_guard.members.insert(connection.clone());

            debug!(
                connection = %connection,
                from = ?from,
                to = %to,
                members = to_guard.members.len(),
                "Moved connection"
            );

            return Move {
                changed: true,
                joined_new_channel,
                peers,
                left_behind,
            };
        }
    }

    /// Remove `connection` from `channel`, pruning the channel if it empties.
    ///
    /// Returns the remaining members, or `None` if the connection was not a
    /// member. Leaving twice is harmless.
    pub fn leave(&self, connection: &ConnectionId, channel: &str) -> Option<Vec<ConnectionId>> {
        let slot = self.slot(channel)?;
        let mut guard = slot.lock();

        if guard.retired || !guard.members.remove(connection) {
            trace!(connection = %connection, channel = %channel, "Leave for non-member");
            return None;
        }

        debug!(
            connection = %connection,
            channel = %channel,
            members = guard.members.len(),
            "Left channel"
        );

        if guard.members.is_empty() {
            self.retire(channel, &slot, &mut guard);
            Some(Vec::new())
        } else {
            Some(guard.others(None))
        }
    }

    /// Snapshot of the members of `channel`, minus `excluding`.
    #[must_use]
    pub fn members_of(&self, channel: &str, excluding: Option<&ConnectionId>) -> Vec<ConnectionId> {
        self.slot(channel)
            .map(|slot| slot.lock().others(excluding))
            .unwrap_or_default()
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn contains_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Number of members in `channel`.
    #[must_use]
    pub fn member_count(&self, channel: &str) -> usize {
        self.slot(channel)
            .map(|slot| slot.lock().members.len())
            .unwrap_or(0)
    }

    /// Number of live channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if there are no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// All channel ids.
    #[must_use]
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Channels that list `connection` as a member. Never more than one.
    #[must_use]
    pub fn memberships(&self, connection: &ConnectionId) -> Vec<ChannelId> {
        let slots: Vec<(ChannelId, Slot)> = self
            .channels
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().members.contains(connection))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Lock the source (optional) and destination channels in lexical id order.
fn lock_pair<'a>(
    from: Option<(&str, &'a Slot)>,
    to: (&str, &'a Slot),
) -> (Option<MutexGuard<'a, Channel>>, MutexGuard<'a, Channel>) {
    let (to_id, to_slot) = to;
    match from {
        Some((from_id, from_slot)) if from_id < to_id => {
            let from_guard = from_slot.lock();
            (Some(from_guard), to_slot.lock())
        }
        Some((_, from_slot)) => {
            let to_guard = to_slot.lock();
            (Some(from_slot.lock()), to_guard)
        }
        None => (None, to_slot.lock()),
    }
}
