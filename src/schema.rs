//! Input schemas for actions.
//!
//! Every action may declare the shape of its input. The host validates raw client input against
//! it before the action may touch canonical state, and predicting clients run the very same
//! validation so that predicted and authoritative results agree.
//!
//! Numeric fields with a declared `min`/`max` are clamped rather than rejected: input from a
//! lagging or manipulated client is pulled back into range instead of dropping the action.
//! Unknown input fields are dropped silently.
//!
//! # Example
//!
//! ```
//! use rampart::schema::{validate, Schema};
//! use rampart::Value;
//!
//! let schema: Schema = serde_json::from_value(serde_json::json!({
//!     "speed": {"type": "number", "max": 300}
//! })).unwrap();
//!
//! let input: Value = serde_json::json!({"speed": 999, "cheat": true}).into();
//! let clean = validate(&schema, &input).unwrap();
//! assert_eq!(clean, serde_json::json!({"speed": 300}).into());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Map, Value};

/// Primitive type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Any finite number.
    Number,
    /// A finite number without fractional part.
    Integer,
    /// A string.
    String,
    /// `true` or `false`.
    Boolean,
    /// An array with arbitrary elements.
    Array,
    /// An object with arbitrary fields.
    Object,
    /// Anything, including `null`.
    Any,
}

impl FieldType {
    /// Name used in diagnostics, matching the JSON schema spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Number | Self::Integer, Value::Number(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Required type.
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Lower bound for numeric fields. Smaller values are clamped up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for numeric fields. Larger values are clamped down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Whether the field may be missing.
    #[serde(default)]
    pub optional: bool,
    /// Value used for a missing optional field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSchema {
    /// A required field of the given type.
    #[must_use]
    pub const fn new(kind: FieldType) -> Self {
        Self {
            kind,
            min: None,
            max: None,
            optional: false,
            default: None,
        }
    }

    /// A required number.
    #[must_use]
    pub const fn number() -> Self {
        Self::new(FieldType::Number)
    }

    /// A required integer.
    #[must_use]
    pub const fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    /// A required string.
    #[must_use]
    pub const fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// A required boolean.
    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    /// Sets the lower clamp bound.
    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the upper clamp bound.
    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Marks the field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the field optional with a fallback value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(default.into());
        self
    }

    fn check(&self, name: &str, value: &Value) -> Result<Value, ValidationFailure> {
        if !self.kind.accepts(value) {
            return Err(ValidationFailure::new(
                Some(name),
                ValidationReason::WrongType {
                    expected: self.kind,
                    found: value.kind(),
                },
            ));
        }
        let Value::Number(n) = value else {
            return Ok(value.clone());
        };
        if self.kind == FieldType::Any {
            return Ok(value.clone());
        }
        if !n.is_finite() {
            return Err(ValidationFailure::new(Some(name), ValidationReason::NotFinite));
        }
        if self.kind == FieldType::Integer && n.fract() != 0.0 {
            return Err(ValidationFailure::new(
                Some(name),
                ValidationReason::NotAnInteger,
            ));
        }
        Ok(Value::Number(self.clamp(*n)))
    }

    /// Upper bound is applied last, so it wins when `min > max`.
    fn clamp(&self, mut n: f64) -> f64 {
        if let Some(min) = self.min {
            if n < min {
                n = min;
            }
        }
        if let Some(max) = self.max {
            if n > max {
                n = max;
            }
        }
        n
    }
}

/// Declared shape of an action's input: field name to field declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldSchema>,
}

impl Schema {
    /// An empty schema. Accepts any object and drops all of its fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field declaration.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Declared fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Validates `input`; see [`validate`].
    pub fn validate(&self, input: &Value) -> Result<Value, ValidationFailure> {
        let Value::Object(fields) = input else {
            return Err(ValidationFailure::new(
                None,
                ValidationReason::NotAnObject {
                    found: input.kind(),
                },
            ));
        };

        let mut clean = Map::new();
        for (name, field) in &self.fields {
            match fields.get(name) {
                Some(value) => {
                    clean.insert(name.clone(), field.check(name, value)?);
                },
                None if field.optional => {
                    if let Some(default) = &field.default {
                        clean.insert(name.clone(), default.clone());
                    }
                },
                None => {
                    return Err(ValidationFailure::new(
                        Some(name),
                        ValidationReason::MissingField,
                    ))
                },
            }
        }
        Ok(Value::Object(clean))
    }
}

/// Validates and normalizes `input` against `schema`.
///
/// Returns the cleaned input: only declared fields, numbers clamped into range, defaults filled
/// in. Validation is deterministic, so host and predicting clients always agree on the result.
pub fn validate(schema: &Schema, input: &Value) -> Result<Value, ValidationFailure> {
    schema.validate(input)
}

/// Why input was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationReason {
    /// Action input must be an object.
    NotAnObject {
        /// Kind of value that was supplied instead.
        found: &'static str,
    },
    /// A required field is absent.
    MissingField,
    /// A field has the wrong type.
    WrongType {
        /// Declared type.
        expected: FieldType,
        /// Kind of value that was supplied.
        found: &'static str,
    },
    /// A numeric field is NaN or infinite.
    NotFinite,
    /// An integer field has a fractional part.
    NotAnInteger,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { found } => write!(f, "input must be an object, got {}", found),
            Self::MissingField => f.write_str("required field is missing"),
            Self::WrongType { expected, found } => {
                write!(f, "expected {}, got {}", expected, found)
            },
            Self::NotFinite => f.write_str("number must be finite"),
            Self::NotAnInteger => f.write_str("number must be an integer"),
        }
    }
}

/// Input rejected by a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Offending field, or `None` when the input as a whole is malformed.
    pub field: Option<String>,
    /// What was wrong with it.
    pub reason: ValidationReason,
}

impl ValidationFailure {
    /// Creates a failure for `field`.
    #[must_use]
    pub fn new(field: Option<&str>, reason: ValidationReason) -> Self {
        Self {
            field: field.map(str::to_owned),
            reason,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "field '{}': {}", field, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for ValidationFailure {}
