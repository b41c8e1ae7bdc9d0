//! Connection Hub
//!
//! Process-wide registry of live socket connections and the chat rooms they
//! are bound to. Register, unregister and broadcast all run under one lock,
//! so a connection is in a room's member set exactly when it is live.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::infrastructure::metrics;

/// An encoded outbound frame, shared between every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Opaque id assigned to a connection at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Connections whose queue accepted the frame
    pub delivered: usize,
    /// Connections that missed the frame (queue full or writer gone)
    pub dropped: usize,
}

struct Entry {
    user_id: String,
    chat_id: String,
    sender: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Entry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn remove(&mut self, id: ConnectionId) -> Option<Entry> {
        let entry = self.connections.remove(&id)?;
        if let Some(members) = self.rooms.get_mut(&entry.chat_id) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&entry.chat_id);
            }
        }
        Some(entry)
    }
}

/// Registry coordinating which connections belong to which room.
///
/// The hub owns the only sender of every connection's outbound queue, so
/// unregistering a connection is what closes its write loop.
#[derive(Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection in `chat_id` and return the receiving end of
    /// its outbound queue.
    pub fn register(
        &self,
        id: ConnectionId,
        user_id: &str,
        chat_id: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Frame> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let count = {
            let mut state = self.state.lock();
            // Re-registering an id rebinds it; drop the old membership first
            state.remove(id);
            state.connections.insert(
                id,
                Entry {
                    user_id: user_id.to_string(),
                    chat_id: chat_id.to_string(),
                    sender,
                },
            );
            state.rooms.entry(chat_id.to_string()).or_default().insert(id);
            state.connections.len()
        };

        metrics::set_websocket_connections(count);
        tracing::info!(
            connection_id = %id,
            user_id = %user_id,
            chat_id = %chat_id,
            "Connection registered"
        );
        receiver
    }

    /// Remove a connection from the live set and its room.
    ///
    /// Returns `false` if it was not registered; repeated calls are no-ops.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut state = self.state.lock();
            let removed = state.remove(id);
            (removed, state.connections.len())
        };

        match removed {
            Some(entry) => {
                metrics::set_websocket_connections(count);
                tracing::info!(
                    connection_id = %id,
                    user_id = %entry.user_id,
                    chat_id = %entry.chat_id,
                    "Connection unregistered"
                );
                // Dropping the entry drops the queue sender
                true
            }
            None => false,
        }
    }

    /// Queue `frame` for every connection in `chat_id` without waiting.
    ///
    /// A member whose queue is full misses this frame and stays registered.
    pub fn broadcast(&self, chat_id: &str, frame: Frame) -> BroadcastStats {
        let mut stats = BroadcastStats::default();
        let mut full = 0;
        {
            let state = self.state.lock();
            let Some(members) = state.rooms.get(chat_id) else {
                return stats;
            };

            for id in members {
                let Some(entry) = state.connections.get(id) else {
                    continue;
                };
                match entry.sender.try_send(Arc::clone(&frame)) {
                    Ok(()) => stats.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        full += 1;
                        stats.dropped += 1;
                        tracing::warn!(
                            connection_id = %id,
                            chat_id = %chat_id,
                            "Outbound queue full, dropping frame"
                        );
                    }
                    Err(TrySendError::Closed(_)) => stats.dropped += 1,
                }
            }
        }

        metrics::record_broadcast();
        metrics::record_frames_dropped("queue_full", full);
        metrics::record_frames_dropped("closed", stats.dropped - full);
        tracing::debug!(
            chat_id = %chat_id,
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Broadcast"
        );
        stats
    }

    /// Queue a private frame for one connection.
    pub fn send_to(&self, id: ConnectionId, frame: Frame) -> bool {
        let result = {
            let state = self.state.lock();
            match state.connections.get(&id) {
                Some(entry) => entry.sender.try_send(frame),
                None => return false,
            }
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "Outbound queue full, dropping private frame");
                metrics::record_frames_dropped("queue_full", 1);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Connection ids currently bound to `chat_id`.
    pub fn room_members(&self, chat_id: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .rooms
            .get(chat_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Unregisters `id` when dropped.
    pub fn guard(self: &Arc<Self>, id: ConnectionId) -> HubGuard {
        HubGuard {
            hub: Arc::clone(self),
            id,
        }
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        let members: usize = state.rooms.values().map(HashSet::len).sum();
        members == state.connections.len()
            && state.rooms.iter().all(|(chat_id, ids)| {
                !ids.is_empty()
                    && ids.iter().all(|id| {
                        state
                            .connections
                            .get(id)
                            .is_some_and(|entry| &entry.chat_id == chat_id)
                    })
            })
    }
}

/// Ties a connection's registration to a scope.
pub struct HubGuard {
    hub: Arc<Hub>,
    id: ConnectionId,
}

impl HubGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for HubGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
