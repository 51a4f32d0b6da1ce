use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::RuntimeEvent;

/// An opaque iterator that drains events from a runtime.
///
/// Obtain one by calling [`GameRuntime::events()`]. Events not consumed before the iterator is
/// dropped are discarded, like with any [`Drain`].
///
/// ```ignore
/// for event in runtime.events() {
///     match event {
///         RuntimeEvent::DesyncDetected { tick, .. } => println!("prediction discarded at {tick}"),
///         _ => {}
///     }
/// }
/// ```
///
/// [`GameRuntime::events()`]: crate::GameRuntime::events
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, RuntimeEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, RuntimeEvent>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = RuntimeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::iter_with_drain)]
mod tests {
    use super::*;
    use crate::PlayerId;
    use std::collections::VecDeque;

    fn joined(id: &str) -> RuntimeEvent {
        RuntimeEvent::PlayerJoined {
            player_id: PlayerId::from(id),
        }
    }

    #[test]
    fn drains_in_fifo_order_and_empties_the_queue() {
        let mut queue: VecDeque<RuntimeEvent> = [joined("a"), joined("b")].into_iter().collect();
        let drained: Vec<_> = EventDrain::from_drain(queue.drain(..)).collect();
        assert_eq!(drained, vec![joined("a"), joined("b")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn reports_exact_length_and_iterates_backwards() {
        let mut queue: VecDeque<RuntimeEvent> =
            [joined("a"), joined("b"), joined("c")].into_iter().collect();
        let mut drain = EventDrain::from_drain(queue.drain(..));
        assert_eq!(drain.len(), 3);
        assert_eq!(drain.next_back(), Some(joined("c")));
        assert_eq!(drain.len(), 2);
        assert!(format!("{:?}", drain).contains("remaining: 2"));
    }

    #[test]
    fn dropping_unconsumed_drain_discards_events() {
        let mut queue: VecDeque<RuntimeEvent> = [joined("a")].into_iter().collect();
        drop(EventDrain::from_drain(queue.drain(..)));
        assert!(queue.is_empty());
    }

    #[test]
    fn fused_after_exhaustion() {
        let mut queue: VecDeque<RuntimeEvent> = VecDeque::new();
        let mut drain = EventDrain::from_drain(queue.drain(..));
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }
}
