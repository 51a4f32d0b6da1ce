//! # Rampart
//!
//! Rampart is a host-authoritative state synchronization engine for multiplayer games, written in
//! 100% safe Rust.
//!
//! One peer, the host, owns the canonical [`GameState`] and applies every action. Clients may
//! predict their own actions locally for instant feedback; the host answers with minimal
//! structural [`Patch`]es, and clients reconcile by rebasing still-pending predictions onto the
//! confirmed state. When a prediction turns out wrong, authority wins: the client adopts the
//! host's state and reports a [`RuntimeEvent::DesyncDetected`].
//!
//! The engine never touches sockets itself. It talks to a [`Transport`] that you implement for
//! your network stack, or to the in-process [`LocalHub`] for tests and single-process setups.
//! Nothing runs in the background either: you call [`GameRuntime::poll`],
//! [`GameRuntime::on_tick`] and [`GameRuntime::submit_action`] from your own loop.
//!
//! ```
//! use rampart::prelude::*;
//! use serde_json::json;
//!
//! let definition = GameDefinition::builder(|ctx| {
//!     let players: Value = ctx
//!         .player_ids
//!         .iter()
//!         .map(|id| (id.to_string(), Value::from(json!({"x": 100}))))
//!         .collect();
//!     let mut state = Value::object();
//!     state.insert("players", players);
//!     state
//! })
//! .action(
//!     ActionDefinition::new("move", |state, ctx, input| {
//!         let dx = input.get("dx").and_then(Value::as_f64).unwrap_or(0.0);
//!         if let Some(player) = state
//!             .get_mut("players")
//!             .and_then(|players| players.get_mut(ctx.player_id.as_str()))
//!         {
//!             let x = player.get("x").and_then(Value::as_f64).unwrap_or(0.0);
//!             player.insert("x", x + dx);
//!         }
//!     })
//!     .with_schema(Schema::new().field("dx", FieldSchema::number().min(-10.0).max(10.0)))
//!     .predicted(true),
//! )
//! .build()?;
//!
//! let hub = LocalHub::new();
//! let mut host = RuntimeBuilder::new()
//!     .with_player_ids(["p1", "p2"])
//!     .build(definition.clone(), hub.connect("p1", true)?)?;
//! let mut client = RuntimeBuilder::new()
//!     .with_player_ids(["p1", "p2"])
//!     .build(definition, hub.connect("p2", false)?)?;
//! host.setup()?;
//! client.setup()?;
//!
//! client.submit_action("move", json!({"dx": 5}))?;
//! host.poll()?;
//! client.poll()?;
//!
//! assert_eq!(client.game_state(), host.game_state());
//! assert_eq!(client.pending_actions(), 0);
//! # Ok::<(), RampartError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use definition::{GameDefinition, GameDefinitionBuilder, SetupContext};
pub use error::{RampartError, RampartResult};
pub use network::local_transport::{LocalHub, LocalTransport};
pub use network::messages::{ActionMessage, Message, PatchMessage};
pub use network::transport::{PeerRecord, Transport, TransportEvent};
pub use patch::{Patch, PatchError, PatchOp, Path, PathSegment};
pub use registry::{ActionContext, ActionDefinition, ActionError, ActionRegistry, ApplyFn};
pub use runtime::builder::RuntimeBuilder;
pub use runtime::config::RuntimeConfig;
pub use runtime::event_drain::EventDrain;
pub use runtime::game_runtime::{GameRuntime, SubmitOutcome};
pub use schema::{FieldSchema, FieldType, Schema, ValidationFailure, ValidationReason};
pub use value::{GameState, Map, Value};

pub mod definition;
// Everything in here is re-exported at the crate root.
#[doc(hidden)]
pub mod error;
pub mod patch;
pub mod prelude;
pub mod registry;
pub mod schema;
pub mod telemetry;
pub mod value;

pub mod network {
    //! Wire messages, their codec and the transport port.

    pub mod codec;
    pub mod local_transport;
    pub mod messages;
    pub mod transport;
}

pub mod runtime {
    //! The game runtime and its construction.

    /// Builder for [`GameRuntime`](crate::GameRuntime).
    pub mod builder;
    pub mod config;
    /// Iterator over drained runtime events.
    pub mod event_drain;
    pub mod game_runtime;
    pub mod pending;
}

/// A discrete authoritative simulation step counted by the host.
///
/// The host tags every patch it broadcasts with its current tick and then advances, so patch
/// ticks are strictly increasing.
///
/// ```
/// use rampart::Tick;
///
/// let tick = Tick::ZERO;
/// assert_eq!(tick.next(), Tick(1));
/// assert!(tick.next() > tick);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// The first tick of a session.
    pub const ZERO: Tick = Tick(0);

    /// The tick after this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Tick {
        Tick(self.0.saturating_add(1))
    }

    /// Returns the underlying counter.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque player identifier supplied by the host environment.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&PlayerId> for PlayerId {
    fn from(id: &PlayerId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for PlayerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a [`GameRuntime`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    /// Built, but [`GameRuntime::setup`] has not run yet.
    Uninitialized,
    /// Synchronizing normally.
    Running,
    /// Client only: the host left. State is frozen at the last confirmed patch and local
    /// actions are refused.
    Degraded,
    /// [`GameRuntime::dispose`] was called. Terminal.
    Disposed,
}

/// Notifications drained through [`GameRuntime::events`].
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm when matching.
///
/// ```
/// use rampart::RuntimeEvent;
///
/// fn handle(event: RuntimeEvent) {
///     match event {
///         RuntimeEvent::DesyncDetected { tick, mismatched_paths } => {
///             println!("desync at {tick}: {} path(s)", mismatched_paths.len());
///         }
///         RuntimeEvent::HostDisconnected => println!("host gone"),
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RuntimeEvent {
    /// Client only: a prediction disagreed with the host. Pending predictions were discarded and
    /// the host's state adopted. Raised at most once per patch.
    DesyncDetected {
        /// Tick of the patch that exposed the divergence.
        tick: Tick,
        /// Paths whose predicted value differs from the authoritative one.
        mismatched_paths: Vec<Path>,
    },
    /// Host only: a remote action was dropped because it was unknown or failed validation.
    ActionRejected {
        /// The submitting player.
        player_id: PlayerId,
        /// The action name.
        action: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A message was ignored because it broke the protocol.
    ProtocolViolation {
        /// The sender as reported by the transport.
        from: PlayerId,
        /// What was wrong with it.
        reason: String,
    },
    /// A player entered the session.
    PlayerJoined {
        /// The new player.
        player_id: PlayerId,
    },
    /// A player left the session.
    PlayerLeft {
        /// The departed player.
        player_id: PlayerId,
    },
    /// Client only: the host left and the runtime is now [`RuntimeState::Degraded`].
    HostDisconnected,
}

/// Passed to [`GameRuntime::on_change`] listeners with every state change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeMeta {
    /// `true` while the visible state includes unconfirmed predictions.
    pub predicted: bool,
    /// Host: the tick of the broadcast. Client: the last confirmed tick.
    pub tick: Tick,
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn tick_orders_and_advances() {
        assert!(Tick::ZERO < Tick(1));
        assert_eq!(Tick(41).next().as_u64(), 42);
        assert_eq!(Tick(u64::MAX).next(), Tick(u64::MAX));
        assert_eq!(Tick::default(), Tick::ZERO);
    }

    #[test]
    fn tick_serializes_as_plain_integer() {
        assert_eq!(serde_json::to_string(&Tick(7)).unwrap(), "7");
        assert_eq!(serde_json::from_str::<Tick>("7").unwrap(), Tick(7));
        assert_eq!(Tick(7).to_string(), "7");
    }

    #[test]
    fn player_id_is_a_transparent_string() {
        let id = PlayerId::from("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
        assert_eq!(id.to_string(), "p1");
        assert_eq!(id, PlayerId::new(String::from("p1")));
        assert!(PlayerId::from("a") < PlayerId::from("b"));
    }

    #[test]
    fn runtime_event_equality() {
        let a = RuntimeEvent::PlayerJoined {
            player_id: PlayerId::from("p3"),
        };
        assert_eq!(a.clone(), a);
        assert_ne!(a, RuntimeEvent::HostDisconnected);
    }
}
