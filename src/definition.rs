//! The game definition consumed from the surrounding application.
//!
//! A [`GameDefinition`] bundles everything game-specific: how to build the initial state, the
//! registered actions, and optional per-tick and membership hooks. It is cheap to clone and every
//! peer holds its own copy; the action registry inside is frozen once [`build`] returns.
//!
//! [`build`]: GameDefinitionBuilder::build

use std::fmt;
use std::sync::Arc;

use crate::error::RampartError;
use crate::registry::{ActionDefinition, ActionRegistry};
use crate::value::GameState;
use crate::PlayerId;

/// Input to the setup function.
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    /// Players known when the session starts.
    pub player_ids: &'a [PlayerId],
}

type SetupFn = Arc<dyn Fn(&SetupContext<'_>) -> GameState + Send + Sync>;
type TickFn = Arc<dyn Fn(&mut GameState) + Send + Sync>;
type PlayerHookFn = Arc<dyn Fn(&mut GameState, &PlayerId) + Send + Sync>;

/// Everything the runtime needs to know about a particular game.
#[derive(Clone)]
pub struct GameDefinition {
    setup: SetupFn,
    registry: Arc<ActionRegistry>,
    on_tick: Option<TickFn>,
    on_player_join: Option<PlayerHookFn>,
    on_player_leave: Option<PlayerHookFn>,
}

impl GameDefinition {
    /// Starts a definition from its setup function.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart::{ActionDefinition, GameDefinition, Value};
    ///
    /// let definition = GameDefinition::builder(|ctx| {
    ///     let mut state = Value::object();
    ///     state.insert("players", ctx.player_ids.len());
    ///     state
    /// })
    /// .action(ActionDefinition::new("noop", |_, _, _| {}))
    /// .build()
    /// .unwrap();
    ///
    /// assert!(definition.actions().contains("noop"));
    /// ```
    pub fn builder<F>(setup: F) -> GameDefinitionBuilder
    where
        F: Fn(&SetupContext<'_>) -> GameState + Send + Sync + 'static,
    {
        GameDefinitionBuilder {
            setup: Arc::new(setup),
            actions: Vec::new(),
            on_tick: None,
            on_player_join: None,
            on_player_leave: None,
        }
    }

    /// Builds the initial state for the given players.
    #[must_use]
    pub fn setup(&self, player_ids: &[PlayerId]) -> GameState {
        (self.setup)(&SetupContext { player_ids })
    }

    /// The frozen action registry.
    #[must_use]
    pub fn actions(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Whether a per-tick update hook is declared.
    #[must_use]
    pub fn has_tick_hook(&self) -> bool {
        self.on_tick.is_some()
    }

    pub(crate) fn run_tick(&self, state: &mut GameState) {
        if let Some(hook) = &self.on_tick {
            hook(state);
        }
    }

    pub(crate) fn run_player_join(&self, state: &mut GameState, player_id: &PlayerId) {
        if let Some(hook) = &self.on_player_join {
            hook(state, player_id);
        }
    }

    pub(crate) fn run_player_leave(&self, state: &mut GameState, player_id: &PlayerId) {
        if let Some(hook) = &self.on_player_leave {
            hook(state, player_id);
        }
    }
}

impl fmt::Debug for GameDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameDefinition")
            .field("actions", &self.registry.names().collect::<Vec<_>>())
            .field("on_tick", &self.on_tick.is_some())
            .field("on_player_join", &self.on_player_join.is_some())
            .field("on_player_leave", &self.on_player_leave.is_some())
            .finish_non_exhaustive()
    }
}

/// Collects actions and hooks for a [`GameDefinition`].
#[must_use = "GameDefinitionBuilder must be consumed by calling build()"]
pub struct GameDefinitionBuilder {
    setup: SetupFn,
    actions: Vec<ActionDefinition>,
    on_tick: Option<TickFn>,
    on_player_join: Option<PlayerHookFn>,
    on_player_leave: Option<PlayerHookFn>,
}

impl GameDefinitionBuilder {
    /// Registers an action.
    pub fn action(mut self, definition: ActionDefinition) -> Self {
        self.actions.push(definition);
        self
    }

    /// Per-tick update run by the host on every [`GameRuntime::on_tick`](crate::GameRuntime::on_tick).
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut GameState) + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(hook));
        self
    }

    /// Runs on the host when a new player joins the room.
    pub fn on_player_join<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut GameState, &PlayerId) + Send + Sync + 'static,
    {
        self.on_player_join = Some(Arc::new(hook));
        self
    }

    /// Runs on the host when a player leaves the room.
    pub fn on_player_leave<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut GameState, &PlayerId) + Send + Sync + 'static,
    {
        self.on_player_leave = Some(Arc::new(hook));
        self
    }

    /// Freezes the definition.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if two actions share a name.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn build(self) -> Result<GameDefinition, RampartError> {
        let mut registry = ActionRegistry::new();
        for action in self.actions {
            registry.register(action)?;
        }
        Ok(GameDefinition {
            setup: self.setup,
            registry: Arc::new(registry),
            on_tick: self.on_tick,
            on_player_join: self.on_player_join,
            on_player_leave: self.on_player_leave,
        })
    }
}

impl fmt::Debug for GameDefinitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameDefinitionBuilder")
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn players() -> Vec<PlayerId> {
        vec![PlayerId::from("p1"), PlayerId::from("p2")]
    }

    #[test]
    fn setup_receives_player_ids() {
        let definition = GameDefinition::builder(|ctx| {
            ctx.player_ids
                .iter()
                .map(|id| (id.as_str().to_owned(), Value::from(0)))
                .collect()
        })
        .build()
        .unwrap();
        let state = definition.setup(&players());
        assert_eq!(state.get("p2"), Some(&Value::from(0)));
    }

    #[test]
    fn duplicate_action_names_fail_to_build() {
        let result = GameDefinition::builder(|_| Value::object())
            .action(ActionDefinition::new("a", |_, _, _| {}))
            .action(ActionDefinition::new("a", |_, _, _| {}))
            .build();
        assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
    }

    #[test]
    fn hooks_run_only_when_declared() {
        let bare = GameDefinition::builder(|_| Value::object()).build().unwrap();
        let mut state = Value::object();
        bare.run_tick(&mut state);
        bare.run_player_join(&mut state, &PlayerId::from("p3"));
        assert_eq!(state, Value::object());
        assert!(!bare.has_tick_hook());

        let hooked = GameDefinition::builder(|_| Value::object())
            .on_tick(|state| {
                let n = state.get("ticks").and_then(Value::as_f64).unwrap_or(0.0);
                state.insert("ticks", n + 1.0);
            })
            .on_player_join(|state, id| state.insert(id.as_str(), true))
            .on_player_leave(|state, id| {
                if let Some(map) = state.as_object_mut() {
                    map.remove(id.as_str());
                }
            })
            .build()
            .unwrap();
        hooked.run_tick(&mut state);
        hooked.run_player_join(&mut state, &PlayerId::from("p3"));
        assert_eq!(state.get("ticks"), Some(&Value::from(1)));
        assert_eq!(state.get("p3"), Some(&Value::Bool(true)));
        hooked.run_player_leave(&mut state, &PlayerId::from("p3"));
        assert_eq!(state.get("p3"), None);
    }

    #[test]
    fn clones_share_the_frozen_registry() {
        let definition = GameDefinition::builder(|_| Value::object())
            .action(ActionDefinition::new("a", |_, _, _| {}))
            .build()
            .unwrap();
        let copy = definition.clone();
        assert!(Arc::ptr_eq(&definition.registry, &copy.registry));
    }
}
