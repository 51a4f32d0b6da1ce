use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::registry::ActionError;
use crate::schema::ValidationFailure;
use crate::RuntimeState;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), RampartError>`].
///
/// [`Result<(), RampartError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq)]
pub enum RampartError {
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// The operation needs a running runtime, but the runtime is in another lifecycle state.
    NotRunning {
        /// The lifecycle state the runtime was in.
        state: RuntimeState,
    },
    /// No action with this name is registered in the game definition.
    UnknownAction {
        /// The requested action name.
        name: String,
    },
    /// The action input did not satisfy the action's input schema. The action was not applied.
    ValidationFailed {
        /// Which field failed and why.
        failure: ValidationFailure,
    },
    /// Too many predicted actions are waiting for the host. No further local input is accepted until the host catches up.
    PredictionThreshold,
    /// The host left the room. No authoritative patches will arrive anymore, so client actions are refused.
    HostDisconnected,
    /// Serialization or deserialization of data failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

impl Display for RampartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampartError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            RampartError::NotRunning { state } => {
                write!(f, "The runtime is not running (current state: {:?}).", state)
            },
            RampartError::UnknownAction { name } => {
                write!(f, "Unknown action '{}'", name)
            },
            RampartError::ValidationFailed { failure } => {
                write!(f, "Action input rejected: {}", failure)
            },
            RampartError::PredictionThreshold => {
                write!(
                    f,
                    "Prediction threshold is reached, cannot accept more local actions until the host acknowledges pending ones."
                )
            },
            RampartError::HostDisconnected => {
                write!(
                    f,
                    "The host has disconnected; no authoritative state updates are possible."
                )
            },
            RampartError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            },
            RampartError::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            },
        }
    }
}

impl Error for RampartError {}

impl From<ActionError> for RampartError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::UnknownAction { name } => RampartError::UnknownAction { name },
            ActionError::Validation(failure) => RampartError::ValidationFailed { failure },
        }
    }
}

/// Result type used by all fallible public operations.
pub type RampartResult<T> = Result<T, RampartError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::ValidationReason;

    #[test]
    fn display_includes_context() {
        let err = RampartError::InvalidRequest {
            info: "bad player".to_owned(),
        };
        assert_eq!(err.to_string(), "Invalid Request: bad player");

        let err = RampartError::UnknownAction {
            name: "jump".to_owned(),
        };
        assert!(err.to_string().contains("jump"));
    }

    #[test]
    fn action_error_converts_into_matching_variant() {
        let err: RampartError = ActionError::UnknownAction {
            name: "fly".to_owned(),
        }
        .into();
        assert_eq!(
            err,
            RampartError::UnknownAction {
                name: "fly".to_owned()
            }
        );

        let failure = ValidationFailure::new(Some("speed"), ValidationReason::NotFinite);
        let err: RampartError = ActionError::Validation(failure.clone()).into();
        assert_eq!(err, RampartError::ValidationFailed { failure });
    }

    #[test]
    fn not_running_reports_state() {
        let err = RampartError::NotRunning {
            state: RuntimeState::Disposed,
        };
        assert!(err.to_string().contains("Disposed"));
    }
}
