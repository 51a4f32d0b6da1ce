//! In-process reference transport.
//!
//! A [`LocalHub`] is a room shared by any number of [`LocalTransport`]s living in the same process.
//! Every message is encoded to JSON on send and decoded once per recipient, so peers never share
//! state by reference and anything that would not survive a real wire fails here too.
//!
//! The room is a star: a host broadcast reaches every client, a client broadcast reaches only the
//! host. Unicasts go wherever they are addressed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::RampartError;
use crate::network::codec::{decode_message, encode_message};
use crate::network::messages::Message;
use crate::network::transport::{PeerRecord, Transport, TransportEvent};
use crate::PlayerId;

#[derive(Debug, Default)]
struct Slot {
    is_host: bool,
    inbox: VecDeque<TransportEvent>,
}

#[derive(Debug, Default)]
struct Room {
    peers: BTreeMap<PlayerId, Slot>,
    duplicate_delivery: bool,
}

impl Room {
    fn has_host(&self) -> bool {
        self.peers.values().any(|slot| slot.is_host)
    }

    fn notify_others(&mut self, except: &PlayerId, event: &TransportEvent) {
        for (id, slot) in &mut self.peers {
            if id != except {
                slot.inbox.push_back(event.clone());
            }
        }
    }
}

/// A shared in-process room. Cloning the hub yields another handle to the same room.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    room: Arc<Mutex<Room>>,
}

impl LocalHub {
    /// Creates an empty room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When enabled, every message is delivered twice to exercise at-least-once handling.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.room.lock().duplicate_delivery = enabled;
    }

    /// Adds a peer to the room and returns its transport.
    ///
    /// Peers already in the room are told about the newcomer with [`TransportEvent::PeerJoined`].
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `player_id` is already connected, or if `is_host` is set
    ///   while the room already has a host.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn connect(
        &self,
        player_id: impl Into<PlayerId>,
        is_host: bool,
    ) -> Result<LocalTransport, RampartError> {
        let player_id = player_id.into();
        let mut room = self.room.lock();
        if room.peers.contains_key(&player_id) {
            return Err(RampartError::InvalidRequest {
                info: format!("player '{}' is already connected", player_id),
            });
        }
        if is_host && room.has_host() {
            return Err(RampartError::InvalidRequest {
                info: "the room already has a host".to_owned(),
            });
        }
        debug!(player = %player_id, is_host, "peer connected to local hub");
        let joined = TransportEvent::PeerJoined(PeerRecord {
            player_id: player_id.clone(),
            is_host,
        });
        room.notify_others(&player_id, &joined);
        room.peers.insert(
            player_id.clone(),
            Slot {
                is_host,
                inbox: VecDeque::new(),
            },
        );
        Ok(LocalTransport {
            room: Arc::clone(&self.room),
            player_id,
            is_host,
            connected: true,
        })
    }

    /// Player ids currently in the room.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PlayerId> {
        self.room.lock().peers.keys().cloned().collect()
    }

    /// Number of events waiting in all inboxes.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.room.lock().peers.values().map(|slot| slot.inbox.len()).sum()
    }
}

/// One peer's handle on a [`LocalHub`]. Disconnects when dropped.
#[derive(Debug)]
pub struct LocalTransport {
    room: Arc<Mutex<Room>>,
    player_id: PlayerId,
    is_host: bool,
    connected: bool,
}

impl LocalTransport {
    /// Returns `true` until [`disconnect`](Transport::disconnect) is called.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, message: &Message, target: Option<&PlayerId>) {
        if !self.connected {
            warn!(player = %self.player_id, kind = message.kind(), "send after disconnect dropped");
            return;
        }
        let bytes = match encode_message(message) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(player = %self.player_id, error = %err, "message dropped");
                return;
            },
        };
        let mut room = self.room.lock();
        let copies = if room.duplicate_delivery { 2 } else { 1 };
        for (id, slot) in &mut room.peers {
            let addressed = match target {
                Some(target) => target == id,
                None => self.is_host || slot.is_host,
            };
            if *id == self.player_id || !addressed {
                continue;
            }
            for _ in 0..copies {
                match decode_message(&bytes) {
                    Ok(message) => slot.inbox.push_back(TransportEvent::Message {
                        from: self.player_id.clone(),
                        message,
                    }),
                    Err(err) => {
                        warn!(player = %self.player_id, error = %err, "message dropped");
                        return;
                    },
                }
            }
            trace!(from = %self.player_id, to = %id, bytes = bytes.len(), "delivered");
        }
        if let Some(target) = target {
            if !room.peers.contains_key(target) {
                trace!(from = %self.player_id, to = %target, "unicast to absent peer dropped");
            }
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        if !self.connected {
            return Vec::new();
        }
        self.room
            .lock()
            .peers
            .get_mut(&self.player_id)
            .map(|slot| slot.inbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    fn peer_ids(&self) -> Vec<PlayerId> {
        self.room
            .lock()
            .peers
            .keys()
            .filter(|id| **id != self.player_id)
            .cloned()
            .collect()
    }

    fn is_host(&self) -> bool {
        self.is_host
    }

    fn host_id(&self) -> Option<PlayerId> {
        self.room
            .lock()
            .peers
            .iter()
            .find(|(_, slot)| slot.is_host)
            .map(|(id, _)| id.clone())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let mut room = self.room.lock();
        room.peers.remove(&self.player_id);
        room.notify_others(&self.player_id, &TransportEvent::PeerLeft(self.player_id.clone()));
        if self.is_host {
            room.notify_others(&self.player_id, &TransportEvent::HostDisconnected);
        }
        debug!(player = %self.player_id, is_host = self.is_host, "peer left local hub");
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
