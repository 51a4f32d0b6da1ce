//! The transport port consumed by the runtime.

use serde::{Deserialize, Serialize};

use crate::network::messages::Message;
use crate::PlayerId;

/// A peer as reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// The peer's opaque player id.
    pub player_id: PlayerId,
    /// Whether this peer is the room's authority.
    pub is_host: bool,
}

/// Something that happened on the transport since the last poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A message from another peer.
    Message {
        /// The sender as identified by the transport, not by the message body.
        from: PlayerId,
        /// The decoded message.
        message: Message,
    },
    /// A peer entered the room.
    PeerJoined(PeerRecord),
    /// A peer left the room.
    PeerLeft(PlayerId),
    /// The host left the room. No further authoritative patches will arrive.
    HostDisconnected,
}

/// Implement this trait to run the runtime over your own network stack.
///
/// Delivery may be at-least-once and unordered between distinct peers, but it must preserve
/// ordering per sender. Only JSON-serialisable payloads may be assumed; see
/// [`codec`](crate::network::codec) for the canonical encoding.
///
/// The runtime never blocks on a transport: it pushes outgoing messages with [`send`] and pulls
/// everything that arrived with [`poll_events`] from its own [`poll`](crate::GameRuntime::poll).
///
/// [`send`]: Transport::send
/// [`poll_events`]: Transport::poll_events
pub trait Transport {
    /// Sends `message` to `target`, or to every other peer in the room when `target` is `None`.
    ///
    /// A client only ever broadcasts actions, which only the host needs; transports may route
    /// client broadcasts to the host alone, as [`LocalHub`](crate::LocalHub) does.
    fn send(&mut self, message: &Message, target: Option<&PlayerId>);

    /// Returns all events received since the last time this method was called.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// The local peer's player id.
    fn player_id(&self) -> &PlayerId;

    /// Player ids of every other peer currently in the room.
    fn peer_ids(&self) -> Vec<PlayerId>;

    /// Whether the local peer is the room's host.
    fn is_host(&self) -> bool;

    /// The room's host, if the transport knows it.
    ///
    /// Clients accept patches and membership messages only from the host. When this returns
    /// `None`, a client trusts the first peer that sends it one.
    fn host_id(&self) -> Option<PlayerId> {
        None
    }

    /// Leaves the room. Further sends are dropped.
    fn disconnect(&mut self);
}
