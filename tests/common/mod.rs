//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `arena`: a small game where players move on a plane, with a clamped `move` action
//! - `Session`: a host and any number of clients wired through one [`LocalHub`]
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{arena, Session};
//! ```

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::cell::RefCell;
use std::rc::Rc;

use rampart::prelude::*;
use rampart::GameDefinitionBuilder;

/// Upper bound on poll rounds in [`Session::settle`]. A quiet room needs far fewer.
pub const MAX_SETTLE_ROUNDS: usize = 32;

/// Largest step a single `move` may take in either axis.
pub const MAX_STEP: f64 = 10.0;

fn player_entry() -> Value {
    let mut entry = Value::object();
    entry.insert("x", 0);
    entry.insert("y", 0);
    entry
}

/// `move` as the host runs it: adds `dx`/`dy` to the caller's position.
pub fn move_action(scale: f64) -> ActionDefinition {
    ActionDefinition::new("move", move |state, ctx, input| {
        let dx = input.get("dx").and_then(Value::as_f64).unwrap_or(0.0);
        let dy = input.get("dy").and_then(Value::as_f64).unwrap_or(0.0);
        let Some(player) = state
            .get_mut("players")
            .and_then(|players| players.get_mut(ctx.player_id.as_str()))
        else {
            return;
        };
        let x = player.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = player.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        player.insert("x", x + dx * scale);
        player.insert("y", y + dy * scale);
    })
    .with_schema(
        Schema::new()
            .field("dx", FieldSchema::number().min(-MAX_STEP).max(MAX_STEP))
            .field(
                "dy",
                FieldSchema::number().min(-MAX_STEP).max(MAX_STEP).with_default(0),
            ),
    )
    .predicted(true)
}

/// The arena without any actions: one `{x, y}` entry per player, spawned and despawned by the
/// join and leave hooks.
pub fn arena_builder() -> GameDefinitionBuilder {
    GameDefinition::builder(|ctx| {
        let players: Value = ctx
            .player_ids
            .iter()
            .map(|id| (id.to_string(), player_entry()))
            .collect();
        let mut state = Value::object();
        state.insert("players", players);
        state.insert("pings", 0);
        state
    })
    .on_player_join(|state, player_id| {
        if let Some(players) = state.get_mut("players") {
            players.insert(player_id.as_str(), player_entry());
        }
    })
    .on_player_leave(|state, player_id| {
        if let Some(players) = state.get_mut("players").and_then(Value::as_object_mut) {
            players.remove(player_id.as_str());
        }
    })
    .action(ActionDefinition::new("ping", |state, _, _| {
        let pings = state.get("pings").and_then(Value::as_f64).unwrap_or(0.0);
        state.insert("pings", pings + 1.0);
    }))
    .action(ActionDefinition::new("tag", |state, ctx, _| {
        let tagged = ctx
            .target_id
            .as_ref()
            .map_or(Value::Null, |target| Value::from(target.as_str()));
        state.insert("tagged", tagged);
    }))
}

/// The standard arena with a faithful `move`.
pub fn arena() -> GameDefinition {
    arena_builder().action(move_action(1.0)).build().unwrap()
}

/// A position as `(x, y)`.
pub fn position(runtime: &GameRuntime, player: &str) -> (f64, f64) {
    let entry = runtime
        .game_state()
        .get("players")
        .and_then(|players| players.get(player))
        .unwrap_or_else(|| panic!("no player '{}' in {}", player, runtime.game_state()));
    (
        entry.get("x").and_then(Value::as_f64).unwrap(),
        entry.get("y").and_then(Value::as_f64).unwrap(),
    )
}

/// Collects every change notification a runtime emits.
pub fn record_changes(runtime: &mut GameRuntime) -> Rc<RefCell<Vec<ChangeMeta>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    runtime.on_change(move |_, meta| sink.borrow_mut().push(meta));
    seen
}

/// A host and its clients in one room.
pub struct Session {
    pub hub: LocalHub,
    pub host: GameRuntime,
    pub clients: Vec<GameRuntime>,
}

impl Session {
    /// Host `p1` and the given clients, all running `definition`.
    pub fn new(definition: &GameDefinition, clients: &[&str]) -> Self {
        Self::with_definitions(definition, definition, clients)
    }

    /// Like [`Session::new`], but clients run `client_definition`.
    pub fn with_definitions(
        host_definition: &GameDefinition,
        client_definition: &GameDefinition,
        clients: &[&str],
    ) -> Self {
        Self::build(host_definition, client_definition, clients, RuntimeConfig::default())
    }

    pub fn build(
        host_definition: &GameDefinition,
        client_definition: &GameDefinition,
        clients: &[&str],
        config: RuntimeConfig,
    ) -> Self {
        let hub = LocalHub::new();
        let players: Vec<&str> = std::iter::once("p1").chain(clients.iter().copied()).collect();

        // Clients connect before the host so the host starts without pending join
        // notifications and its first broadcast is tick 0.
        let transports: Vec<LocalTransport> = clients
            .iter()
            .map(|id| hub.connect(*id, false).unwrap())
            .collect();

        let mut host = RuntimeBuilder::new()
            .with_host(true)
            .with_player_ids(players.iter().copied())
            .with_config(config)
            .build(host_definition.clone(), hub.connect("p1", true).unwrap())
            .unwrap();
        host.setup().unwrap();

        let clients = transports
            .into_iter()
            .map(|transport| {
                let mut client = RuntimeBuilder::new()
                    .with_host(false)
                    .with_player_ids(players.iter().copied())
                    .with_config(config)
                    .build(client_definition.clone(), transport)
                    .unwrap();
                client.setup().unwrap();
                client
            })
            .collect();

        let mut session = Self { hub, host, clients };
        session.settle();
        session.drain_events();
        session
    }

    /// Polls every runtime until nothing is left in flight.
    pub fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            if self.host.state() != RuntimeState::Disposed {
                self.host.poll().unwrap();
            }
            for client in &mut self.clients {
                if client.state() != RuntimeState::Disposed {
                    client.poll().unwrap();
                }
            }
            if self.hub.in_flight() == 0 {
                return;
            }
        }
        panic!("session did not settle after {} rounds", MAX_SETTLE_ROUNDS);
    }

    /// Discards all queued runtime events.
    pub fn drain_events(&mut self) {
        self.host.events().for_each(drop);
        for client in &mut self.clients {
            client.events().for_each(drop);
        }
    }

    pub fn client(&mut self, index: usize) -> &mut GameRuntime {
        &mut self.clients[index]
    }

    /// Asserts every client shows exactly the host's state.
    pub fn assert_converged(&self) {
        for client in &self.clients {
            assert_eq!(
                client.game_state(),
                self.host.game_state(),
                "client {} diverged from the host",
                client.player_id()
            );
        }
    }
}
