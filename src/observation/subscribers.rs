// ============================================================================
// spark-observe - Subscriber Registry
// Identity-keyed subscriber set with inline slots and snapshot broadcast
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::core::types::same_rc;

/// Subscribers stored inline before spilling into the overflow list
const INLINE_SLOTS: usize = 3;

// =============================================================================
// SUBSCRIBER REGISTRY
// =============================================================================

/// A set of subscribers keyed by pointer identity.
///
/// The first three subscribers live in fixed slots, the rest in an overflow
/// list. Broadcasting iterates a snapshot taken before the first callback
/// runs, so subscribers may subscribe or unsubscribe (themselves or others)
/// while a broadcast is in flight. A subscriber removed mid-broadcast is still
/// called for that broadcast if it was in the snapshot.
pub struct SubscriberRegistry<S: ?Sized> {
    slots: RefCell<[Option<Rc<S>>; INLINE_SLOTS]>,
    rest: RefCell<Vec<Rc<S>>>,
}

impl<S: ?Sized> SubscriberRegistry<S> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new([None, None, None]),
            rest: RefCell::new(Vec::new()),
        }
    }

    /// Register a subscriber. Returns false if it was already registered.
    pub fn add(&self, subscriber: Rc<S>) -> bool {
        if self.has(&subscriber) {
            return false;
        }
        let mut slots = self.slots.borrow_mut();
        if let Some(empty) = slots.iter_mut().find(|slot| slot.is_none()) {
            *empty = Some(subscriber);
            return true;
        }
        drop(slots);
        self.rest.borrow_mut().push(subscriber);
        true
    }

    /// Unregister a subscriber. Returns false if it was not registered.
    pub fn remove(&self, subscriber: &Rc<S>) -> bool {
        {
            let mut slots = self.slots.borrow_mut();
            for slot in slots.iter_mut() {
                if slot.as_ref().is_some_and(|s| same_rc(s, subscriber)) {
                    *slot = None;
                    return true;
                }
            }
        }
        let mut rest = self.rest.borrow_mut();
        match rest.iter().position(|s| same_rc(s, subscriber)) {
            Some(index) => {
                rest.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, subscriber: &Rc<S>) -> bool {
        self.slots
            .borrow()
            .iter()
            .flatten()
            .any(|s| same_rc(s, subscriber))
            || self.rest.borrow().iter().any(|s| same_rc(s, subscriber))
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().iter().flatten().count() + self.rest.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current subscribers, inline slots first.
    pub fn snapshot(&self) -> SmallVec<[Rc<S>; INLINE_SLOTS]> {
        let mut snapshot: SmallVec<[Rc<S>; INLINE_SLOTS]> =
            self.slots.borrow().iter().flatten().cloned().collect();
        snapshot.extend(self.rest.borrow().iter().cloned());
        snapshot
    }

    /// Call `f` once for every subscriber in the pre-broadcast snapshot.
    pub fn broadcast(&self, mut f: impl FnMut(&S)) {
        for subscriber in self.snapshot() {
            f(&*subscriber);
        }
    }
}

impl<S: ?Sized> Default for SubscriberRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PropertySubscriber;
    use crate::core::value::Value;
    use std::cell::Cell;

    struct Counter {
        calls: Cell<u32>,
    }

    impl Counter {
        fn new() -> Rc<Self> {
            Rc::new(Self { calls: Cell::new(0) })
        }
    }

    impl PropertySubscriber for Counter {
        fn handle_change(&self, _new: &Value, _old: &Value, _flags: u32) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    fn as_sub(c: &Rc<Counter>) -> Rc<dyn PropertySubscriber> {
        c.clone()
    }

    #[test]
    fn add_is_idempotent() {
        let registry: SubscriberRegistry<dyn PropertySubscriber> = SubscriberRegistry::new();
        let a = Counter::new();
        assert!(registry.add(as_sub(&a)));
        assert!(!registry.add(as_sub(&a)));
        assert_eq!(registry.len(), 1);

        registry.broadcast(|s| s.handle_change(&Value::Null, &Value::Null, 0));
        assert_eq!(a.calls.get(), 1);
    }

    #[test]
    fn overflow_beyond_inline_slots() {
        let registry: SubscriberRegistry<dyn PropertySubscriber> = SubscriberRegistry::new();
        let counters: Vec<_> = (0..6).map(|_| Counter::new()).collect();
        for c in &counters {
            assert!(registry.add(as_sub(c)));
        }
        assert_eq!(registry.len(), 6);

        assert!(registry.remove(&as_sub(&counters[4])));
        assert!(!registry.remove(&as_sub(&counters[4])));
        assert!(registry.remove(&as_sub(&counters[1])));

        registry.broadcast(|s| s.handle_change(&Value::Null, &Value::Null, 0));
        let calls: Vec<u32> = counters.iter().map(|c| c.calls.get()).collect();
        assert_eq!(calls, vec![1, 0, 1, 1, 0, 1]);
    }

    #[test]
    fn freed_slot_is_reused() {
        let registry: SubscriberRegistry<dyn PropertySubscriber> = SubscriberRegistry::new();
        let a = Counter::new();
        let b = Counter::new();
        registry.add(as_sub(&a));
        registry.remove(&as_sub(&a));
        registry.add(as_sub(&b));
        assert_eq!(registry.len(), 1);
        assert!(registry.rest.borrow().is_empty());
    }

    struct SelfRemover {
        registry: Rc<SubscriberRegistry<dyn PropertySubscriber>>,
        me: RefCell<Option<Rc<dyn PropertySubscriber>>>,
        calls: Cell<u32>,
    }

    impl PropertySubscriber for SelfRemover {
        fn handle_change(&self, _new: &Value, _old: &Value, _flags: u32) {
            self.calls.set(self.calls.get() + 1);
            if let Some(me) = self.me.borrow_mut().take() {
                self.registry.remove(&me);
            }
        }
    }

    #[test]
    fn unsubscribe_during_broadcast_uses_snapshot() {
        let registry: Rc<SubscriberRegistry<dyn PropertySubscriber>> =
            Rc::new(SubscriberRegistry::new());
        let remover = Rc::new(SelfRemover {
            registry: registry.clone(),
            me: RefCell::new(None),
            calls: Cell::new(0),
        });
        let remover_sub: Rc<dyn PropertySubscriber> = remover.clone();
        *remover.me.borrow_mut() = Some(remover_sub.clone());
        let tail = Counter::new();

        registry.add(remover_sub);
        registry.add(as_sub(&tail));

        registry.broadcast(|s| s.handle_change(&Value::Null, &Value::Null, 0));
        assert_eq!(remover.calls.get(), 1);
        assert_eq!(tail.calls.get(), 1);
        assert_eq!(registry.len(), 1);

        registry.broadcast(|s| s.handle_change(&Value::Null, &Value::Null, 0));
        assert_eq!(remover.calls.get(), 1);
        assert_eq!(tail.calls.get(), 2);
        *remover.me.borrow_mut() = None;
    }
}
