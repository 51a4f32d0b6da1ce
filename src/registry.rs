//! Named actions and the registry that applies them.
//!
//! An [`ActionDefinition`] pairs a name with an apply-function, an optional input [`Schema`] and
//! a `predict` flag. The [`ActionRegistry`] is built once from the game definition and never
//! changes afterwards: a different action set needs a new runtime.
//!
//! Apply-functions must be pure functions of `(state, context, input)`. Predicting clients
//! replay them against fresh baselines whenever the host's patches arrive, so hidden global state
//! inside an apply-function turns into desyncs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RampartError;
use crate::schema::{Schema, ValidationFailure};
use crate::value::{GameState, Value};
use crate::{PlayerId, Tick};

/// Signature of an action's apply-function.
pub type ApplyFn = Arc<dyn Fn(&mut GameState, &ActionContext, &Value) + Send + Sync>;

/// Who performs an action, against whom, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    /// The player that submitted the action.
    pub player_id: PlayerId,
    /// Optional player the action is aimed at.
    pub target_id: Option<PlayerId>,
    /// The tick the action is applied at. On a predicting client this is the last tick it has
    /// confirmed from the host.
    pub tick: Tick,
}

/// A named, optionally predicted, state transition.
#[derive(Clone)]
pub struct ActionDefinition {
    name: String,
    input_schema: Option<Schema>,
    apply: ApplyFn,
    predict: bool,
}

impl ActionDefinition {
    /// Creates an unpredicted action without input schema.
    ///
    /// Actions are host-only until [`predicted`](Self::predicted) opts them into client-side
    /// prediction; only do that for actions whose outcome does not depend on server-side
    /// randomness or on other players' concurrent input.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut GameState, &ActionContext, &Value) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            input_schema: None,
            apply: Arc::new(apply),
            predict: false,
        }
    }

    /// Declares the input shape. Input is validated (and clamped) before every application.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Enables or disables client-side prediction.
    #[must_use]
    pub fn predicted(mut self, predict: bool) -> Self {
        self.predict = predict;
        self
    }

    /// The action's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether clients apply this action locally before the host confirms it.
    #[must_use]
    pub fn predict(&self) -> bool {
        self.predict
    }

    /// The declared input shape, if any.
    #[must_use]
    pub fn input_schema(&self) -> Option<&Schema> {
        self.input_schema.as_ref()
    }

    /// Validates input against the schema. Without schema the input is taken as is.
    pub fn validate(&self, input: &Value) -> Result<Value, ValidationFailure> {
        match &self.input_schema {
            Some(schema) => schema.validate(input),
            None => Ok(input.clone()),
        }
    }

    /// Runs the apply-function with already validated input.
    pub(crate) fn run(&self, state: &mut GameState, ctx: &ActionContext, input: &Value) {
        (self.apply)(state, ctx, input);
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("input_schema", &self.input_schema)
            .field("predict", &self.predict)
            .finish_non_exhaustive()
    }
}

/// Why an action could not be applied. The state is untouched in both cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No action with this name is registered.
    UnknownAction {
        /// The requested name.
        name: String,
    },
    /// The input failed schema validation.
    Validation(ValidationFailure),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction { name } => write!(f, "unknown action '{}'", name),
            Self::Validation(failure) => write!(f, "invalid input: {}", failure),
        }
    }
}

impl std::error::Error for ActionError {}

/// Lookup table from action name to definition.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionDefinition>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if an action with the same name is already registered.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn register(&mut self, definition: ActionDefinition) -> Result<(), RampartError> {
        if self.actions.contains_key(definition.name()) {
            return Err(RampartError::InvalidRequest {
                info: format!("action '{}' is registered twice", definition.name()),
            });
        }
        self.actions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(name)
    }

    /// Returns `true` if an action with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Resolves `name` and validates `input` without touching any state.
    pub fn validate(&self, name: &str, input: &Value) -> Result<Value, ActionError> {
        let definition = self.get(name).ok_or_else(|| ActionError::UnknownAction {
            name: name.to_owned(),
        })?;
        definition.validate(input).map_err(ActionError::Validation)
    }

    /// Validates `input` and, if it passes, applies the action to `state`.
    ///
    /// Returns the validated input. On failure `state` is left untouched.
    pub fn apply(
        &self,
        name: &str,
        state: &mut GameState,
        ctx: &ActionContext,
        input: &Value,
    ) -> Result<Value, ActionError> {
        let definition = self.get(name).ok_or_else(|| ActionError::UnknownAction {
            name: name.to_owned(),
        })?;
        let clean = definition.validate(input).map_err(ActionError::Validation)?;
        definition.run(state, ctx, &clean);
        Ok(clean)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, ValidationReason};
    use serde_json::json;

    fn ctx() -> ActionContext {
        ActionContext {
            player_id: PlayerId::from("p1"),
            target_id: None,
            tick: Tick::ZERO,
        }
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry
            .register(
                ActionDefinition::new("add", |state, _ctx, input| {
                    let current = state.get("total").and_then(Value::as_f64).unwrap_or(0.0);
                    let amount = input.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                    state.insert("total", current + amount);
                })
                .with_schema(Schema::new().field("amount", FieldSchema::number().max(10.0)))
                .predicted(true),
            )
            .unwrap();
        registry
            .register(ActionDefinition::new("tag", |state, ctx, _input| {
                state.insert("last", ctx.player_id.as_str());
            }))
            .unwrap();
        registry
    }

    #[test]
    fn apply_validates_then_mutates() {
        let registry = registry();
        let mut state = Value::object();
        let clean = registry
            .apply("add", &mut state, &ctx(), &Value::from(json!({"amount": 50})))
            .unwrap();
        assert_eq!(clean, Value::from(json!({"amount": 10})));
        assert_eq!(state, Value::from(json!({"total": 10})));
    }

    #[test]
    fn failed_validation_leaves_state_untouched() {
        let registry = registry();
        let mut state = Value::from(json!({"total": 1}));
        let err = registry
            .apply("add", &mut state, &ctx(), &Value::object())
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::Validation(ValidationFailure {
                reason: ValidationReason::MissingField,
                ..
            })
        ));
        assert_eq!(state, Value::from(json!({"total": 1})));
    }

    #[test]
    fn unknown_action_is_reported() {
        let registry = registry();
        let mut state = Value::object();
        let err = registry
            .apply("fly", &mut state, &ctx(), &Value::Null)
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::UnknownAction {
                name: "fly".to_owned()
            }
        );
    }

    #[test]
    fn schemaless_action_receives_raw_input() {
        let registry = registry();
        let mut state = Value::object();
        registry
            .apply("tag", &mut state, &ctx(), &Value::Null)
            .unwrap();
        assert_eq!(state.get("last").and_then(Value::as_str), Some("p1"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(ActionDefinition::new("tag", |_, _, _| {}))
            .unwrap_err();
        assert!(matches!(err, RampartError::InvalidRequest { .. }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn predict_defaults_to_false() {
        let registry = registry();
        assert!(registry.get("add").unwrap().predict());
        assert!(!registry.get("tag").unwrap().predict());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["add", "tag"]);
    }
}
