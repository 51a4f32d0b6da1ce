//! Convenient re-exports for common usage.
//!
//! ```rust
//! use rampart::prelude::*;
//! ```
//!
//! The prelude includes the runtime and its builder, the game definition types, the value model
//! and schema types, the transport port with its in-process implementation, and the error and
//! event types.

pub use crate::definition::{GameDefinition, SetupContext};
pub use crate::error::{RampartError, RampartResult};
pub use crate::network::local_transport::{LocalHub, LocalTransport};
pub use crate::network::messages::Message;
pub use crate::network::transport::{PeerRecord, Transport, TransportEvent};
pub use crate::patch::Patch;
pub use crate::registry::{ActionContext, ActionDefinition};
pub use crate::runtime::builder::RuntimeBuilder;
pub use crate::runtime::config::RuntimeConfig;
pub use crate::runtime::game_runtime::{GameRuntime, SubmitOutcome};
pub use crate::schema::{FieldSchema, FieldType, Schema};
pub use crate::value::{GameState, Value};
pub use crate::{ChangeMeta, PlayerId, RuntimeEvent, RuntimeState, Tick};
