//! The orchestrator: canonical state on the host, prediction and reconciliation on clients.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::definition::GameDefinition;
use crate::error::{RampartError, RampartResult};
use crate::network::messages::{ActionMessage, Message, PatchMessage};
use crate::network::transport::{Transport, TransportEvent};
use crate::patch::{self, Patch, Path};
use crate::registry::{ActionContext, ActionError};
use crate::report_violation;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::event_drain::EventDrain;
use crate::runtime::pending::{PendingAction, PendingQueue};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::value::{GameState, Value};
use crate::{ChangeMeta, PlayerId, RuntimeEvent, RuntimeState, Tick};

type ChangeListener = Box<dyn FnMut(&GameState, ChangeMeta)>;

/// What happened to a submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Host only: applied to the canonical state and broadcast at `tick`.
    Applied {
        /// The tick the resulting patch was tagged with.
        tick: Tick,
    },
    /// Client only: applied locally and sent to the host. Visible until the host confirms or
    /// overrides it.
    Predicted {
        /// Sequence number the host will acknowledge.
        seq: u64,
    },
    /// Client only: sent to the host without any local change.
    Sent {
        /// Sequence number the host will acknowledge.
        seq: u64,
    },
}

/// Role-specific state.
enum Role {
    Host {
        /// Highest processed action `seq` per remote player, attached to every patch.
        acks: BTreeMap<PlayerId, u64>,
        /// Canonical state before the first remote action of the current poll.
        batch_start: Option<GameState>,
    },
    Client {
        /// Host-confirmed state with no prediction applied.
        baseline: GameState,
        pending: PendingQueue,
        next_seq: u64,
        /// Tick of the newest applied patch. `None` until the first patch arrives.
        last_patch: Option<Tick>,
        /// The only peer allowed to send patches and membership changes.
        host: Option<PlayerId>,
    },
}

/// A single peer's view of a game session.
///
/// The runtime is driven entirely from outside: call [`poll`](Self::poll) whenever the transport
/// may have delivered something, [`on_tick`](Self::on_tick) at the host's fixed cadence, and
/// [`submit_action`](Self::submit_action) for local input. Every operation runs to completion
/// synchronously; nothing happens in between.
///
/// Construct one with [`RuntimeBuilder`](crate::RuntimeBuilder).
pub struct GameRuntime {
    definition: GameDefinition,
    transport: Box<dyn Transport>,
    config: RuntimeConfig,
    observer: Option<Arc<dyn ViolationObserver>>,
    player_id: PlayerId,
    player_ids: Vec<PlayerId>,
    lifecycle: RuntimeState,
    /// Locally visible state: canonical on the host, baseline plus predictions on a client.
    state: GameState,
    /// Host: tag of the next broadcast. Client: last confirmed host tick.
    tick: Tick,
    role: Role,
    events: VecDeque<RuntimeEvent>,
    listeners: Vec<ChangeListener>,
}

impl GameRuntime {
    pub(crate) fn new(
        definition: GameDefinition,
        transport: Box<dyn Transport>,
        is_host: bool,
        player_ids: Vec<PlayerId>,
        config: RuntimeConfig,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let player_id = transport.player_id().clone();
        let role = if is_host {
            let acks = player_ids
                .iter()
                .filter(|id| **id != player_id)
                .map(|id| (id.clone(), 0))
                .collect();
            Role::Host {
                acks,
                batch_start: None,
            }
        } else {
            Role::Client {
                baseline: Value::Null,
                pending: PendingQueue::new(),
                next_seq: 1,
                last_patch: None,
                host: None,
            }
        };
        Self {
            definition,
            transport,
            config,
            observer,
            player_id,
            player_ids,
            lifecycle: RuntimeState::Uninitialized,
            state: Value::Null,
            tick: Tick::ZERO,
            role,
            events: VecDeque::with_capacity(config.event_queue_size),
            listeners: Vec::new(),
        }
    }

    /// Builds the initial state from the game definition and starts the session.
    ///
    /// Every peer runs setup with the same player list, so clients start in step with the host
    /// even before its first patch arrives.
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if the runtime was already set up or disposed.
    ///
    /// [`InvalidRequest`]: RampartError::InvalidRequest
    pub fn setup(&mut self) -> RampartResult<()> {
        if self.lifecycle != RuntimeState::Uninitialized {
            return Err(RampartError::InvalidRequest {
                info: format!("setup called in state {:?}", self.lifecycle),
            });
        }
        self.state = self.definition.setup(&self.player_ids);
        if let Role::Client { baseline, .. } = &mut self.role {
            *baseline = self.state.clone();
        }
        self.lifecycle = RuntimeState::Running;
        debug!(
            player = %self.player_id,
            is_host = self.is_host(),
            players = self.player_ids.len(),
            "runtime running"
        );
        Ok(())
    }

    /// Submits a local action.
    ///
    /// See [`submit_targeted_action`](Self::submit_targeted_action).
    pub fn submit_action(
        &mut self,
        name: &str,
        input: impl Into<Value>,
    ) -> RampartResult<SubmitOutcome> {
        self.submit(name, input.into(), None)
    }

    /// Submits a local action aimed at another player.
    ///
    /// On the host the action is applied, diffed and broadcast immediately. On a client it is
    /// validated locally, then either predicted (`predict = true`) or only sent to the host.
    ///
    /// # Errors
    /// - [`NotRunning`] before [`setup`](Self::setup) or after [`dispose`](Self::dispose).
    /// - [`HostDisconnected`] on a client whose host has left. Nothing is mutated or sent.
    /// - [`UnknownAction`] / [`ValidationFailed`] if the registry rejects the action.
    /// - [`PredictionThreshold`] if too many predicted actions await the host.
    ///
    /// [`NotRunning`]: RampartError::NotRunning
    /// [`HostDisconnected`]: RampartError::HostDisconnected
    /// [`UnknownAction`]: RampartError::UnknownAction
    /// [`ValidationFailed`]: RampartError::ValidationFailed
    /// [`PredictionThreshold`]: RampartError::PredictionThreshold
    pub fn submit_targeted_action(
        &mut self,
        name: &str,
        input: impl Into<Value>,
        target: impl Into<PlayerId>,
    ) -> RampartResult<SubmitOutcome> {
        self.submit(name, input.into(), Some(target.into()))
    }

    fn submit(
        &mut self,
        name: &str,
        input: Value,
        target_id: Option<PlayerId>,
    ) -> RampartResult<SubmitOutcome> {
        match self.lifecycle {
            RuntimeState::Running => {},
            RuntimeState::Degraded => {
                warn!(player = %self.player_id, action = name, "host disconnected, action dropped");
                return Err(RampartError::HostDisconnected);
            },
            state => return Err(RampartError::NotRunning { state }),
        }
        let registry = self.definition.actions();
        let definition = registry.get(name).ok_or_else(|| RampartError::UnknownAction {
            name: name.to_owned(),
        })?;
        let input = definition
            .validate(&input)
            .map_err(|failure| RampartError::ValidationFailed { failure })?;
        let predict = definition.predict();

        if matches!(self.role, Role::Host { .. }) {
            let before = self.state.clone();
            let ctx = ActionContext {
                player_id: self.player_id.clone(),
                target_id,
                tick: self.tick,
            };
            self.definition.actions().apply(name, &mut self.state, &ctx, &input)?;
            let diff = patch::diff(&before, &self.state);
            let tick = self.broadcast_patch(diff);
            self.notify_change(false, tick);
            return Ok(SubmitOutcome::Applied { tick });
        }

        let confirmed = self.tick;
        let Role::Client { pending, next_seq, .. } = &mut self.role else {
            return Err(RampartError::InternalError {
                context: "client path taken by a host runtime".to_owned(),
            });
        };
        if predict && pending.len() >= self.config.max_pending_actions {
            warn!(
                player = %self.player_id,
                pending = pending.len(),
                "prediction threshold reached"
            );
            return Err(RampartError::PredictionThreshold);
        }
        let seq = *next_seq;
        *next_seq += 1;

        if predict {
            let ctx = ActionContext {
                player_id: self.player_id.clone(),
                target_id: target_id.clone(),
                tick: confirmed,
            };
            let snapshot_before = patch::snapshot(&self.state);
            self.definition.actions().apply(name, &mut self.state, &ctx, &input)?;
            let predicted = patch::diff(&snapshot_before, &self.state);
            pending.push(PendingAction {
                seq,
                tick: confirmed,
                action_name: name.to_owned(),
                input: input.clone(),
                player_id: self.player_id.clone(),
                target_id: target_id.clone(),
                snapshot_before,
                predicted,
            });
        }

        let message = Message::Action(ActionMessage {
            name: name.to_owned(),
            input,
            player_id: self.player_id.clone(),
            tick: Some(confirmed),
            seq: Some(seq),
            target_id,
        });
        trace!(player = %self.player_id, action = name, seq, predict, "action sent to host");
        self.transport.send(&message, None);

        if predict {
            self.notify_change(true, confirmed);
            Ok(SubmitOutcome::Predicted { seq })
        } else {
            Ok(SubmitOutcome::Sent { seq })
        }
    }

    /// Runs the game's per-tick update on the host and broadcasts what it changed.
    ///
    /// The tick advances exactly once per call, whether or not anything changed.
    ///
    /// # Errors
    /// - [`NotRunning`](RampartError::NotRunning) before setup or after dispose.
    /// - [`InvalidRequest`](RampartError::InvalidRequest) on a client.
    pub fn on_tick(&mut self) -> RampartResult<()> {
        self.ensure_active()?;
        if !self.is_host() {
            return Err(RampartError::InvalidRequest {
                info: "on_tick is only valid on the host".to_owned(),
            });
        }
        let before = self.state.clone();
        self.definition.run_tick(&mut self.state);
        let diff = patch::diff(&before, &self.state);
        if diff.is_empty() {
            self.tick = self.tick.next();
        } else {
            let tick = self.broadcast_patch(diff);
            self.notify_change(false, tick);
        }
        Ok(())
    }

    /// Processes everything the transport delivered since the last call.
    ///
    /// On the host, remote actions received in one call are applied in receipt order and
    /// broadcast as a single merged patch.
    ///
    /// # Errors
    /// - [`NotRunning`](RampartError::NotRunning) before setup or after dispose.
    pub fn poll(&mut self) -> RampartResult<()> {
        self.ensure_active()?;
        let events = self.transport.poll_events();
        if !events.is_empty() {
            trace!(player = %self.player_id, count = events.len(), "transport events");
        }
        for event in events {
            match event {
                TransportEvent::Message { from, message } => self.handle_message(from, message),
                TransportEvent::PeerJoined(record) => {
                    if self.is_host() {
                        self.host_player_joined(record.player_id);
                    } else {
                        trace!(
                            player = %self.player_id,
                            peer = %record.player_id,
                            "peer joined, waiting for host"
                        );
                    }
                },
                TransportEvent::PeerLeft(player_id) => {
                    if self.is_host() {
                        self.host_player_left(player_id);
                    } else {
                        trace!(
                            player = %self.player_id,
                            peer = %player_id,
                            "peer left, waiting for host"
                        );
                    }
                },
                TransportEvent::HostDisconnected => self.host_disconnected(),
            }
        }
        self.flush_batch();
        Ok(())
    }

    /// Drains the runtime event queue.
    pub fn events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.events.drain(..))
    }

    /// Registers a listener fired after every change of the locally visible state.
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: FnMut(&GameState, ChangeMeta) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Leaves the session: disconnects the transport and drops pending actions, listeners and
    /// queued events. Every later operation fails with [`NotRunning`](RampartError::NotRunning).
    pub fn dispose(&mut self) {
        if self.lifecycle == RuntimeState::Disposed {
            return;
        }
        self.transport.disconnect();
        if let Role::Client { pending, .. } = &mut self.role {
            pending.clear();
        }
        self.listeners.clear();
        self.events.clear();
        self.lifecycle = RuntimeState::Disposed;
        debug!(player = %self.player_id, "runtime disposed");
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.lifecycle
    }

    /// The locally visible game state. Read-only; mutate through actions.
    #[must_use]
    pub fn game_state(&self) -> &GameState {
        &self.state
    }

    /// Host: the tick the next broadcast will carry. Client: the last confirmed host tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// The newest tick whose state is authoritative on this peer.
    #[must_use]
    pub fn confirmed_tick(&self) -> Tick {
        match &self.role {
            Role::Host { .. } => self.tick,
            Role::Client { last_patch, .. } => last_patch.unwrap_or(Tick::ZERO),
        }
    }

    /// Number of predicted actions awaiting the host. Always zero on the host.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        match &self.role {
            Role::Host { .. } => 0,
            Role::Client { pending, .. } => pending.len(),
        }
    }

    /// The local player.
    #[must_use]
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Players currently in the session, in join order.
    #[must_use]
    pub fn player_ids(&self) -> &[PlayerId] {
        &self.player_ids
    }

    /// Whether this peer is the authority.
    #[must_use]
    pub fn is_host(&self) -> bool {
        matches!(self.role, Role::Host { .. })
    }

    /// The configuration the runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn ensure_active(&self) -> RampartResult<()> {
        match self.lifecycle {
            RuntimeState::Running | RuntimeState::Degraded => Ok(()),
            state => Err(RampartError::NotRunning { state }),
        }
    }

    fn push_event(&mut self, event: RuntimeEvent) {
        if self.events.len() >= self.config.event_queue_size {
            let dropped = self.events.pop_front();
            warn!(player = %self.player_id, ?dropped, "event queue full, oldest event dropped");
        }
        self.events.push_back(event);
    }

    fn notify_change(&mut self, predicted: bool, tick: Tick) {
        let meta = ChangeMeta { predicted, tick };
        for listener in &mut self.listeners {
            listener(&self.state, meta);
        }
    }

    fn protocol_violation(&mut self, from: &PlayerId, reason: String) {
        report_violation!(
            self.observer,
            self.tick,
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            "message from '{}' ignored: {}",
            from,
            reason
        );
        self.push_event(RuntimeEvent::ProtocolViolation {
            from: from.clone(),
            reason,
        });
    }

    fn handle_message(&mut self, from: PlayerId, message: Message) {
        trace!(player = %self.player_id, from = %from, kind = message.kind(), "message received");
        let authoritative = matches!(
            message,
            Message::Patch(_) | Message::Join { .. } | Message::Leave { .. }
        );
        if authoritative && !self.is_host() && !self.sent_by_host(&from) {
            let reason = format!("'{}' messages are only accepted from the host", message.kind());
            self.protocol_violation(&from, reason);
            return;
        }
        match (message, self.is_host()) {
            (Message::Action(action), true) => self.host_apply_remote(from, action),
            (Message::Patch(patch), false) => self.client_apply_patch(&from, patch),
            (Message::Join { player_id }, false) => {
                if !self.player_ids.contains(&player_id) {
                    self.player_ids.push(player_id.clone());
                }
                self.push_event(RuntimeEvent::PlayerJoined { player_id });
            },
            (Message::Leave { player_id }, false) => {
                self.player_ids.retain(|id| *id != player_id);
                self.push_event(RuntimeEvent::PlayerLeft { player_id });
            },
            // Transports that broadcast to the whole room hand clients each other's actions.
            (Message::Action(action), false) => {
                trace!(
                    player = %self.player_id,
                    from = %from,
                    action = %action.name,
                    "peer action ignored"
                );
            },
            (message, is_host) => {
                let role = if is_host { "host" } else { "client" };
                let reason = format!("a {} does not accept '{}' messages", role, message.kind());
                self.protocol_violation(&from, reason);
            },
        }
    }

    /// Client only: whether `from` is the host. The host is learned from the transport, or from
    /// the first authoritative sender when the transport cannot tell.
    fn sent_by_host(&mut self, from: &PlayerId) -> bool {
        let Role::Client { host, .. } = &mut self.role else {
            return false;
        };
        let host = host.get_or_insert_with(|| {
            self.transport.host_id().unwrap_or_else(|| from.clone())
        });
        *host == *from
    }

    // ---------------------------------------------------------------- host

    /// Tags `diff` with the current tick, broadcasts it with the current acks and advances.
    fn broadcast_patch(&mut self, diff: Vec<Patch>) -> Tick {
        let tick = self.tick;
        let acks = match &self.role {
            Role::Host { acks, .. } => acks.clone(),
            Role::Client { .. } => BTreeMap::new(),
        };
        trace!(player = %self.player_id, %tick, ops = diff.len(), "patch broadcast");
        self.transport.send(
            &Message::Patch(PatchMessage {
                patch: diff,
                tick,
                acks,
            }),
            None,
        );
        self.tick = tick.next();
        tick
    }

    fn host_apply_remote(&mut self, from: PlayerId, action: ActionMessage) {
        if action.player_id != from {
            self.protocol_violation(
                &from,
                format!("action claims to come from '{}'", action.player_id),
            );
            return;
        }
        let Role::Host { acks, batch_start } = &mut self.role else {
            return;
        };
        if let Some(seq) = action.seq {
            let last = acks.entry(from.clone()).or_insert(0);
            if seq <= *last {
                warn!(player = %self.player_id, from = %from, seq, "duplicate action ignored");
                return;
            }
            *last = seq;
        }
        if batch_start.is_none() {
            *batch_start = Some(self.state.clone());
        }

        let ctx = ActionContext {
            player_id: from.clone(),
            target_id: action.target_id,
            tick: self.tick,
        };
        match self
            .definition
            .actions()
            .apply(&action.name, &mut self.state, &ctx, &action.input)
        {
            Ok(_) => trace!(
                player = %self.player_id,
                from = %from,
                action = %action.name,
                "remote action applied"
            ),
            Err(err) => {
                let kind = match err {
                    ActionError::UnknownAction { .. } => ViolationKind::Protocol,
                    ActionError::Validation(_) => ViolationKind::Validation,
                };
                report_violation!(
                    self.observer,
                    self.tick,
                    ViolationSeverity::Warning,
                    kind,
                    "action '{}' from '{}' rejected: {}",
                    action.name,
                    from,
                    err
                );
                self.push_event(RuntimeEvent::ActionRejected {
                    player_id: from,
                    action: action.name,
                    reason: err.to_string(),
                });
            },
        }
    }

    /// Broadcasts the merged effect of the remote actions applied during this poll.
    fn flush_batch(&mut self) {
        let Role::Host { batch_start, .. } = &mut self.role else {
            return;
        };
        let Some(before) = batch_start.take() else {
            return;
        };
        let diff = patch::diff(&before, &self.state);
        let changed = !diff.is_empty();
        let tick = self.broadcast_patch(diff);
        if changed {
            self.notify_change(false, tick);
        }
    }

    fn host_player_joined(&mut self, player_id: PlayerId) {
        self.flush_batch();
        let known = self.player_ids.contains(&player_id);
        if let Role::Host { acks, .. } = &mut self.role {
            acks.insert(player_id.clone(), 0);
        }
        let before = self.state.clone();
        if !known {
            self.definition.run_player_join(&mut self.state, &player_id);
            self.player_ids.push(player_id.clone());
        }

        let snapshot_tick = self.tick;
        let acks = match &self.role {
            Role::Host { acks, .. } => acks.clone(),
            Role::Client { .. } => BTreeMap::new(),
        };
        self.transport.send(
            &Message::Patch(PatchMessage {
                patch: vec![Patch::full_state(&self.state)],
                tick: snapshot_tick,
                acks,
            }),
            Some(&player_id),
        );
        self.tick = snapshot_tick.next();
        debug!(
            player = %self.player_id,
            joined = %player_id,
            known,
            tick = %snapshot_tick,
            "full state sent"
        );

        if known {
            return;
        }
        self.transport.send(
            &Message::Join {
                player_id: player_id.clone(),
            },
            None,
        );
        let diff = patch::diff(&before, &self.state);
        let changed = !diff.is_empty();
        let tick = self.broadcast_patch(diff);
        self.push_event(RuntimeEvent::PlayerJoined { player_id });
        if changed {
            self.notify_change(false, tick);
        }
    }

    fn host_player_left(&mut self, player_id: PlayerId) {
        if !self.player_ids.contains(&player_id) {
            trace!(player = %self.player_id, peer = %player_id, "unknown peer left");
            return;
        }
        self.flush_batch();
        if let Role::Host { acks, .. } = &mut self.role {
            acks.remove(&player_id);
        }
        let before = self.state.clone();
        self.definition.run_player_leave(&mut self.state, &player_id);
        self.player_ids.retain(|id| *id != player_id);
        self.transport.send(
            &Message::Leave {
                player_id: player_id.clone(),
            },
            None,
        );
        let diff = patch::diff(&before, &self.state);
        let changed = !diff.is_empty();
        let tick = self.broadcast_patch(diff);
        debug!(player = %self.player_id, left = %player_id, %tick, "player left");
        self.push_event(RuntimeEvent::PlayerLeft { player_id });
        if changed {
            self.notify_change(false, tick);
        }
    }

    // -------------------------------------------------------------- client

    fn client_apply_patch(&mut self, from: &PlayerId, message: PatchMessage) {
        let tolerance = self.config.desync_tolerance;
        let Role::Client {
            baseline,
            pending,
            last_patch,
            ..
        } = &mut self.role
        else {
            return;
        };
        if last_patch.is_some_and(|last| message.tick <= last) {
            warn!(
                player = %self.player_id,
                tick = %message.tick,
                "stale or duplicate patch ignored"
            );
            return;
        }

        let was_predicted = !pending.is_empty();
        let mut next = baseline.clone();
        if let Err(err) = patch::apply_all(&mut next, &message.patch) {
            let reason = format!("patch for tick {} does not apply: {}", message.tick, err);
            self.protocol_violation(from, reason);
            return;
        }
        *baseline = next;
        *last_patch = Some(message.tick);

        let acked = if message.acks.is_empty() {
            pending.acknowledge_through_tick(message.tick)
        } else {
            match message.acks.get(&self.player_id) {
                Some(seq) => pending.acknowledge_through_seq(*seq),
                None => Vec::new(),
            }
        };

        let mismatched = mismatched_paths(&acked, baseline, tolerance);
        let desynced = !mismatched.is_empty();
        let previous = std::mem::replace(&mut self.state, baseline.clone());
        if desynced {
            pending.clear();
        } else {
            let registry = self.definition.actions();
            let mut failed = Vec::new();
            for action in pending.iter_mut() {
                let ctx = ActionContext {
                    player_id: action.player_id.clone(),
                    target_id: action.target_id.clone(),
                    tick: action.tick,
                };
                let before = patch::snapshot(&self.state);
                match registry.apply(&action.action_name, &mut self.state, &ctx, &action.input) {
                    Ok(_) => {
                        action.predicted = patch::diff(&before, &self.state);
                        action.snapshot_before = before;
                    },
                    Err(err) => failed.push((action.seq, err)),
                }
            }
            if !failed.is_empty() {
                pending.retain(|action| failed.iter().all(|(seq, _)| *seq != action.seq));
            }
            for (seq, err) in failed {
                report_violation!(
                    self.observer,
                    message.tick,
                    ViolationSeverity::Critical,
                    ViolationKind::StateManagement,
                    "replay of pending action {} failed: {}",
                    seq,
                    err
                );
            }
        }

        self.tick = message.tick;
        let still_predicted = self.pending_actions() > 0;
        trace!(
            player = %self.player_id,
            tick = %message.tick,
            acked = acked.len(),
            pending = self.pending_actions(),
            "patch applied"
        );
        if desynced {
            debug!(
                player = %self.player_id,
                tick = %message.tick,
                paths = mismatched.len(),
                "desync, prediction discarded"
            );
            report_violation!(
                self.observer,
                message.tick,
                ViolationSeverity::Error,
                ViolationKind::Desync,
                "predicted state diverged at {} path(s), authority wins",
                mismatched.len()
            );
            self.push_event(RuntimeEvent::DesyncDetected {
                tick: message.tick,
                mismatched_paths: mismatched,
            });
        }
        // Ack-only patches that neither change the state nor settle a prediction stay silent.
        if self.state != previous || still_predicted != was_predicted {
            self.notify_change(still_predicted, message.tick);
        }
    }

    fn host_disconnected(&mut self) {
        if self.is_host() || self.lifecycle != RuntimeState::Running {
            return;
        }
        self.lifecycle = RuntimeState::Degraded;
        let mut reverted = false;
        if let Role::Client { baseline, pending, .. } = &mut self.role {
            if !pending.is_empty() {
                pending.clear();
                self.state = baseline.clone();
                reverted = true;
            }
        }
        report_violation!(
            self.observer,
            self.tick,
            ViolationSeverity::Warning,
            ViolationKind::Transport,
            "host disconnected, runtime degraded"
        );
        self.push_event(RuntimeEvent::HostDisconnected);
        if reverted {
            self.notify_change(false, self.tick);
        }
    }
}

/// Paths whose last predicted value among `acked` disagrees with `baseline`.
fn mismatched_paths(acked: &[PendingAction], baseline: &GameState, tolerance: f64) -> Vec<Path> {
    let mut predicted: BTreeMap<&Path, Option<&Value>> = BTreeMap::new();
    for action in acked {
        for patch in &action.predicted {
            predicted.insert(&patch.path, patch.value.as_ref());
        }
    }
    predicted
        .into_iter()
        .filter(|(path, expected)| {
            let actual = baseline.get_path(path);
            match (expected, actual) {
                (Some(expected), Some(actual)) => !expected.approx_eq(actual, tolerance),
                (None, None) => false,
                _ => true,
            }
        })
        .map(|(path, _)| path.clone())
        .collect()
}

impl fmt::Debug for GameRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRuntime")
            .field("player_id", &self.player_id)
            .field("is_host", &self.is_host())
            .field("state", &self.lifecycle)
            .field("tick", &self.tick)
            .field("pending_actions", &self.pending_actions())
            .field("players", &self.player_ids)
            .finish_non_exhaustive()
    }
}
