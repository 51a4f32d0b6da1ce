use std::sync::Arc;

use tracing::debug;

use crate::definition::GameDefinition;
use crate::error::RampartError;
use crate::network::transport::Transport;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::game_runtime::GameRuntime;
use crate::telemetry::ViolationObserver;
use crate::PlayerId;

/// The [`RuntimeBuilder`] configures and constructs a [`GameRuntime`].
///
/// ```
/// use rampart::{GameDefinition, LocalHub, RuntimeBuilder, RuntimeConfig, Value};
///
/// let definition = GameDefinition::builder(|_| Value::object()).build()?;
/// let hub = LocalHub::new();
///
/// let mut host = RuntimeBuilder::new()
///     .with_host(true)
///     .with_player_ids(["p1", "p2"])
///     .with_config(RuntimeConfig::competitive())
///     .build(definition, hub.connect("p1", true)?)?;
/// host.setup()?;
/// assert!(host.is_host());
/// # Ok::<(), rampart::RampartError>(())
/// ```
#[must_use = "RuntimeBuilder must be consumed by calling build()"]
#[derive(Default)]
pub struct RuntimeBuilder {
    is_host: Option<bool>,
    player_ids: Option<Vec<PlayerId>>,
    config: RuntimeConfig,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            is_host,
            player_ids,
            config,
            violation_observer,
        } = self;
        f.debug_struct("RuntimeBuilder")
            .field("is_host", is_host)
            .field("player_ids", player_ids)
            .field("config", config)
            .field("violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl RuntimeBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares whether the local peer is the host. Checked against the transport in
    /// [`build`](Self::build); defaults to whatever the transport reports.
    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = Some(is_host);
        self
    }

    /// Players known at session start, passed to the game's setup function. Defaults to the
    /// local player followed by the transport's current peers.
    pub fn with_player_ids<I, P>(mut self, player_ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlayerId>,
    {
        self.player_ids = Some(player_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Caps the number of predicted actions awaiting the host.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `max` is zero.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn with_max_pending_actions(mut self, max: usize) -> Result<Self, RampartError> {
        if max == 0 {
            return Err(RampartError::InvalidRequest {
                info: "max_pending_actions must be at least 1".to_owned(),
            });
        }
        self.config.max_pending_actions = max;
        Ok(self)
    }

    /// Sets the capacity of the runtime event queue. Older events are dropped when it overflows.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `size` is zero.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn with_event_queue_size(mut self, size: usize) -> Result<Self, RampartError> {
        if size == 0 {
            return Err(RampartError::InvalidRequest {
                info: "event_queue_size must be at least 1".to_owned(),
            });
        }
        self.config.event_queue_size = size;
        Ok(self)
    }

    /// Sets the numeric tolerance used when checking predictions against the host.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if `tolerance` is negative or NaN.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn with_desync_tolerance(mut self, tolerance: f64) -> Result<Self, RampartError> {
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(RampartError::InvalidRequest {
                info: format!("desync_tolerance must be a non-negative number, got {}", tolerance),
            });
        }
        self.config.desync_tolerance = tolerance;
        Ok(self)
    }

    /// Routes protocol violations, desyncs and rejected input to `observer` instead of the
    /// default tracing output.
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder and creates an uninitialized runtime. Call
    /// [`GameRuntime::setup`] to start it.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the declared role disagrees with the transport, if the
    ///   local player is missing from the player list, if the list has duplicates, or if the
    ///   configuration is invalid.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn build(
        self,
        definition: GameDefinition,
        transport: impl Transport + 'static,
    ) -> Result<GameRuntime, RampartError> {
        self.config.validate()?;
        let is_host = transport.is_host();
        if let Some(declared) = self.is_host {
            if declared != is_host {
                return Err(RampartError::InvalidRequest {
                    info: format!(
                        "runtime declared is_host={} but the transport reports is_host={}",
                        declared, is_host
                    ),
                });
            }
        }
        let local = transport.player_id().clone();
        let player_ids = match self.player_ids {
            Some(ids) => ids,
            None => std::iter::once(local.clone())
                .chain(transport.peer_ids())
                .collect(),
        };
        if !player_ids.contains(&local) {
            return Err(RampartError::InvalidRequest {
                info: format!("local player '{}' is not in the player list", local),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        if let Some(duplicate) = player_ids.iter().find(|id| !seen.insert(*id)) {
            return Err(RampartError::InvalidRequest {
                info: format!("player '{}' is listed twice", duplicate),
            });
        }
        debug!(player = %local, is_host, players = player_ids.len(), "runtime built");
        Ok(GameRuntime::new(
            definition,
            Box::new(transport),
            is_host,
            player_ids,
            self.config,
            self.violation_observer,
        ))
    }
}
