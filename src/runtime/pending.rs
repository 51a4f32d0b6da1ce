//! Predicted actions waiting for the host.

use std::collections::VecDeque;

use crate::patch::Patch;
use crate::value::{GameState, Value};
use crate::{PlayerId, Tick};

/// A locally predicted action that the host has not acknowledged yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Per-client sequence number carried on the wire.
    pub seq: u64,
    /// Confirmed tick at submission; replays run with the same tick in their context.
    pub tick: Tick,
    /// Registered action name.
    pub action_name: String,
    /// Validated input.
    pub input: Value,
    /// The submitting (local) player.
    pub player_id: PlayerId,
    /// Optional target player.
    pub target_id: Option<PlayerId>,
    /// Locally visible state right before the latest application of this action.
    pub snapshot_before: GameState,
    /// What the latest application changed, relative to `snapshot_before`.
    pub predicted: Vec<Patch>,
}

/// Pending actions in submission order.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    actions: VecDeque<PendingAction>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn push(&mut self, action: PendingAction) {
        debug_assert!(
            self.actions.back().map_or(true, |last| last.seq < action.seq),
            "pending actions must be pushed in sequence order"
        );
        self.actions.push_back(action);
    }

    /// Removes every action the host has processed according to its `acks` entry for us.
    pub(crate) fn acknowledge_through_seq(&mut self, seq: u64) -> Vec<PendingAction> {
        self.drain_front_while(|action| action.seq <= seq)
    }

    /// Removes every action submitted at or before `tick`. Used when the host sends no acks.
    pub(crate) fn acknowledge_through_tick(&mut self, tick: Tick) -> Vec<PendingAction> {
        self.drain_front_while(|action| action.tick <= tick)
    }

    fn drain_front_while(
        &mut self,
        mut acked: impl FnMut(&PendingAction) -> bool,
    ) -> Vec<PendingAction> {
        let count = self.actions.iter().take_while(|action| acked(action)).count();
        self.actions.drain(..count).collect()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PendingAction> {
        self.actions.iter_mut()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&PendingAction) -> bool) {
        self.actions.retain(keep);
    }

    pub(crate) fn clear(&mut self) {
        self.actions.clear();
    }
}
