//! Per-user rooms of live connections.
//!
//! Every authenticated connection joins the room named by its user id, so a
//! user with several tabs open receives each frame once per tab. The room
//! registry is also the presence check for notifications: a user is online
//! while their room is non-empty.

use souk_types::{ObjectId, ServerEvent};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Sessions of one user: session id -> outbound frame sender.
type Room = HashMap<Uuid, mpsc::Sender<String>>;

/// Registry of rooms keyed by user id.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<ObjectId, Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to `user`'s room and returns its session id.
    pub async fn join(&self, user: ObjectId, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(user.clone()).or_default();
        room.insert(session_id, sender);
        tracing::info!(
            user_id = %user,
            session_id = %session_id,
            connections = room.len(),
            "joined room"
        );
        session_id
    }

    /// Removes a connection. Empty rooms are dropped so presence reads false.
    pub async fn leave(&self, user: &ObjectId, session_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(user) else {
            return;
        };
        if room.remove(&session_id).is_none() {
            return;
        }
        let remaining = room.len();
        if remaining == 0 {
            rooms.remove(user);
        }
        tracing::info!(
            user_id = %user,
            session_id = %session_id,
            connections = remaining,
            "left room"
        );
    }

    /// Delivers `event` to every connection in `user`'s room.
    ///
    /// Returns the number of connections the frame was queued for. Frames for
    /// a connection whose buffer is full are dropped.
    pub async fn emit(&self, user: &ObjectId, event: &ServerEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(user_id = %user, "failed to serialize server event: {}", e);
                return 0;
            }
        };

        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(user) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, sender) in room {
            match sender.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user,
                        session_id = %session_id,
                        "dropping frame for slow consumer: {}",
                        e
                    );
                }
            }
        }
        delivered
    }

    /// Returns `true` if `user` has at least one live connection.
    pub async fn is_online(&self, user: &ObjectId) -> bool {
        self.rooms.read().await.contains_key(user)
    }

    /// Number of live connections in `user`'s room.
    pub async fn connection_count(&self, user: &ObjectId) -> usize {
        self.rooms.read().await.get(user).map_or(0, HashMap::len)
    }
}
