// ============================================================================
// spark-observe - Phase Queue
// Idempotent FIFO of lifecycle participants
// ============================================================================

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::core::types::rc_addr;

/// Maximum drain passes before a queue is considered to be feeding itself
const MAX_DRAIN_PASSES: u32 = 1000;

/// FIFO queue in which each participant appears at most once.
///
/// Draining unlinks each node before its callback runs. A node enqueued
/// while the queue drains (including the node being processed) lands in a
/// fresh list that the next pass picks up.
pub(crate) struct PhaseQueue<T: ?Sized> {
    name: &'static str,
    pending: RefCell<VecDeque<Rc<T>>>,
    linked: RefCell<FxHashSet<usize>>,
}

impl<T: ?Sized> PhaseQueue<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: RefCell::new(VecDeque::new()),
            linked: RefCell::new(FxHashSet::default()),
        }
    }

    /// Append `node` unless it is already queued.
    pub(crate) fn enqueue(&self, node: Rc<T>) -> bool {
        if !self.linked.borrow_mut().insert(rc_addr(&node)) {
            return false;
        }
        self.pending.borrow_mut().push_back(node);
        true
    }

    pub(crate) fn count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn is_linked(&self, node: &Rc<T>) -> bool {
        self.linked.borrow().contains(&rc_addr(node))
    }

    /// Process the nodes queued right now, once.
    pub(crate) fn drain_once(&self, mut f: impl FnMut(&Rc<T>)) {
        let captured = std::mem::take(&mut *self.pending.borrow_mut());
        if captured.is_empty() {
            return;
        }
        tracing::trace!(queue = self.name, count = captured.len(), "draining lifecycle queue");
        for node in captured {
            self.linked.borrow_mut().remove(&rc_addr(&node));
            f(&node);
        }
    }

    /// Process nodes until the queue stays empty.
    pub(crate) fn drain(&self, mut f: impl FnMut(&Rc<T>)) {
        let mut passes = 0u32;
        while self.count() > 0 {
            passes += 1;
            if passes > MAX_DRAIN_PASSES {
                panic!(
                    "Maximum drain depth exceeded for the {} queue. A participant keeps \
                     re-enqueueing itself while being processed.",
                    self.name
                );
            }
            self.drain_once(&mut f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent() {
        let queue: PhaseQueue<u32> = PhaseQueue::new("test");
        let node = Rc::new(1);
        assert!(queue.enqueue(node.clone()));
        assert!(!queue.enqueue(node.clone()));
        assert_eq!(queue.count(), 1);
        assert!(queue.is_linked(&node));
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue: PhaseQueue<u32> = PhaseQueue::new("test");
        for n in 1..=3 {
            queue.enqueue(Rc::new(n));
        }
        let mut seen = Vec::new();
        queue.drain(|n| seen.push(**n));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn reentrant_enqueue_runs_in_next_pass() {
        let queue: Rc<PhaseQueue<u32>> = Rc::new(PhaseQueue::new("test"));
        let first = Rc::new(1);
        queue.enqueue(first.clone());

        let mut seen = Vec::new();
        let requeue = queue.clone();
        queue.drain(|n| {
            seen.push(**n);
            if seen.len() == 1 {
                assert!(requeue.enqueue(n.clone()));
                assert!(requeue.enqueue(Rc::new(2)));
            }
        });
        assert_eq!(seen, vec![1, 1, 2]);
    }

    #[test]
    fn drain_once_leaves_late_arrivals() {
        let queue: Rc<PhaseQueue<u32>> = Rc::new(PhaseQueue::new("test"));
        queue.enqueue(Rc::new(1));
        let requeue = queue.clone();
        queue.drain_once(|_| {
            requeue.enqueue(Rc::new(2));
        });
        assert_eq!(queue.count(), 1);
    }

    #[test]
    #[should_panic(expected = "Maximum drain depth exceeded")]
    fn runaway_requeue_panics() {
        let queue: Rc<PhaseQueue<u32>> = Rc::new(PhaseQueue::new("test"));
        queue.enqueue(Rc::new(1));
        let requeue = queue.clone();
        queue.drain(|n| {
            requeue.enqueue(n.clone());
        });
    }
}
