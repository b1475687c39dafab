//! FIFO buffer for payloads sent while no transport is open.

use std::collections::VecDeque;
use std::mem;

use crate::types::Payload;

/// Payloads waiting for the next successful open, oldest first.
#[derive(Debug, Default)]
pub(crate) struct SendQueue {
    buffered: VecDeque<Payload>,
}

impl SendQueue {
    pub(crate) fn push(&mut self, payload: Payload) {
        self.buffered.push_back(payload);
    }

    /// Removes and returns everything currently buffered, in insertion
    /// order. Payloads pushed after the drain started end up in the next
    /// drain, never lost or reordered.
    pub(crate) fn drain(&mut self) -> VecDeque<Payload> {
        mem::take(&mut self.buffered)
    }

    pub(crate) fn len(&self) -> usize {
        self.buffered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Payload {
        Payload::Text(s.into())
    }

    #[test]
    fn drain_preserves_insertion_order() {
        let mut queue = SendQueue::default();
        queue.push(text("a"));
        queue.push(text("b"));
        queue.push(text("c"));

        let drained: Vec<Payload> = queue.drain().into_iter().collect();
        assert_eq!(drained, vec![text("a"), text("b"), text("c")]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn push_after_drain_is_kept_for_next_drain() {
        let mut queue = SendQueue::default();
        queue.push(text("first"));
        let _ = queue.drain();

        queue.push(text("second"));
        let drained: Vec<Payload> = queue.drain().into_iter().collect();
        assert_eq!(drained, vec![text("second")]);
    }

    #[test]
    fn drain_on_empty_queue_yields_nothing() {
        let mut queue = SendQueue::default();
        assert!(queue.drain().is_empty());
    }
}
