//! Wire messages exchanged between peers.
//!
//! Every message is a plain JSON object discriminated by a `type` field:
//!
//! ```text
//! { "type": "action", "name": "move", "input": {...}, "playerId": "p2", "tick": 4, "seq": 1 }
//! { "type": "patch",  "patch": [...], "tick": 5, "acks": { "p2": 1 } }
//! { "type": "join",   "playerId": "p3" }
//! { "type": "leave",  "playerId": "p3" }
//! ```
//!
//! `seq`, `targetId` and `acks` are optional on the wire and omitted when unset, so peers that only
//! understand the minimal shapes keep working.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::value::Value;
use crate::{PlayerId, Tick};

/// A raw action sent from a client to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    /// Registered action name.
    pub name: String,
    /// Unvalidated input. The host validates again on receipt.
    #[serde(default)]
    pub input: Value,
    /// The submitting player.
    pub player_id: PlayerId,
    /// Last tick the client had confirmed when it submitted the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<Tick>,
    /// Per-client sequence number, echoed back through [`PatchMessage::acks`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Optional player the action is aimed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
}

/// An authoritative state change broadcast by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMessage {
    /// Ordered patches; later entries win on overlapping paths.
    pub patch: Vec<Patch>,
    /// Host tick the patch was produced at. Strictly increasing per host.
    pub tick: Tick,
    /// Highest action sequence number the host has processed, per player.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub acks: BTreeMap<PlayerId, u64>,
}

/// Everything that travels over a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Client to host.
    Action(ActionMessage),
    /// Host to clients.
    Patch(PatchMessage),
    /// Host to clients: a player entered the room.
    Join {
        /// The player that joined.
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    /// Host to clients: a player left the room.
    Leave {
        /// The player that left.
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
}

impl Message {
    /// The `type` discriminator as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Patch(_) => "patch",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
        }
    }
}

impl From<ActionMessage> for Message {
    fn from(action: ActionMessage) -> Self {
        Self::Action(action)
    }
}

impl From<PatchMessage> for Message {
    fn from(patch: PatchMessage) -> Self {
        Self::Patch(patch)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::patch::path;
    use serde_json::json;

    #[test]
    fn action_uses_camel_case_and_omits_unset_fields() {
        let msg = Message::Action(ActionMessage {
            name: "move".to_owned(),
            input: Value::from(json!({"dx": 5})),
            player_id: PlayerId::from("p2"),
            tick: Some(Tick(3)),
            seq: None,
            target_id: None,
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "action", "name": "move", "input": {"dx": 5}, "playerId": "p2", "tick": 3})
        );
    }

    #[test]
    fn minimal_action_without_tick_parses() {
        let msg: Message = serde_json::from_value(
            json!({"type": "action", "name": "jump", "input": {}, "playerId": "p1"}),
        )
        .unwrap();
        let Message::Action(action) = msg else {
            panic!("expected an action message");
        };
        assert_eq!(action.tick, None);
        assert_eq!(action.seq, None);
    }

    #[test]
    fn patch_message_shape() {
        let mut acks = BTreeMap::new();
        acks.insert(PlayerId::from("p2"), 7);
        let msg = Message::Patch(PatchMessage {
            patch: vec![Patch::replace(path(["players", "p1", "x"]), 105)],
            tick: Tick(5),
            acks,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "patch",
                "patch": [{"op": "replace", "path": ["players", "p1", "x"], "value": 105}],
                "tick": 5,
                "acks": {"p2": 7}
            })
        );
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn empty_acks_are_omitted() {
        let msg = Message::Patch(PatchMessage {
            patch: Vec::new(),
            tick: Tick(1),
            acks: BTreeMap::new(),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "patch", "patch": [], "tick": 1})
        );
    }

    #[test]
    fn membership_messages() {
        let join: Message = serde_json::from_str(r#"{"type":"join","playerId":"p3"}"#).unwrap();
        assert_eq!(
            join,
            Message::Join {
                player_id: PlayerId::from("p3")
            }
        );
        assert_eq!(join.kind(), "join");
        let leave = Message::Leave {
            player_id: PlayerId::from("p3"),
        };
        assert_eq!(
            serde_json::to_value(&leave).unwrap(),
            json!({"type": "leave", "playerId": "p3"})
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<Message, _> =
            serde_json::from_value(json!({"type": "chat", "text": "hi"}));
        assert!(result.is_err());
    }
}
