// ============================================================================
// spark-observe - Collection Observers
// Immediate and batched notification for arrays, maps and sets
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::index_map::IndexMap;
use crate::core::constants::{IS_COLLECTION_MUTATION, UPDATE_TARGET_INSTANCE};
use crate::core::types::{
    Accessor, BatchedCollectionSubscriber, CollectionSubscriber, MutationKind, PropertyObserver,
    PropertySubscriber,
};
use crate::core::value::{Value, WeakTarget};
use crate::lifecycle::{Flushable, Lifecycle};
use crate::observation::subscribers::SubscriberRegistry;

/// Which collection an observer watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    Map,
    Set,
}

impl CollectionKind {
    /// Name of the size property.
    pub fn length_key(self) -> &'static str {
        match self {
            CollectionKind::Array => "length",
            CollectionKind::Map | CollectionKind::Set => "size",
        }
    }
}

fn live_len(collection: &WeakTarget) -> usize {
    match collection.upgrade() {
        Some(Value::Array(a)) => a.len_untracked(),
        Some(Value::Map(m)) => m.len_untracked(),
        Some(Value::Set(s)) => s.len_untracked(),
        _ => 0,
    }
}

// =============================================================================
// COLLECTION OBSERVER
// =============================================================================

/// Observer attached to one collection.
///
/// Every instrumented mutation updates the index map, notifies the immediate
/// subscribers, and enqueues the observer on the lifecycle flush queue. The
/// flush delivers the accumulated index map to the batched subscribers once,
/// then resets it to identity.
pub struct CollectionObserver {
    kind: CollectionKind,
    collection: WeakTarget,
    lifecycle: Rc<Lifecycle>,
    index_map: RefCell<IndexMap>,
    subscribers: SubscriberRegistry<dyn CollectionSubscriber>,
    batched_subscribers: SubscriberRegistry<dyn BatchedCollectionSubscriber>,
    length_observer: RefCell<Option<Rc<CollectionLengthObserver>>>,
    self_weak: Weak<CollectionObserver>,
}

impl CollectionObserver {
    pub(crate) fn new(kind: CollectionKind, collection: &Value, lifecycle: Rc<Lifecycle>) -> Rc<Self> {
        let collection = collection.downgrade();
        let len = live_len(&collection);
        Rc::new_cyclic(|self_weak| Self {
            kind,
            collection,
            lifecycle,
            index_map: RefCell::new(IndexMap::identity(len)),
            subscribers: SubscriberRegistry::new(),
            batched_subscribers: SubscriberRegistry::new(),
            length_observer: RefCell::new(None),
            self_weak: self_weak.clone(),
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// The observed collection, if still alive.
    pub fn collection(&self) -> Option<Value> {
        self.collection.upgrade()
    }

    /// Snapshot of the index map accumulated since the last flush.
    pub fn index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    pub(crate) fn with_index_map(&self, f: impl FnOnce(&mut IndexMap)) {
        f(&mut self.index_map.borrow_mut());
    }

    /// Start a fresh identity map over the current contents.
    pub fn reset_index_map(&self) {
        *self.index_map.borrow_mut() = IndexMap::identity(live_len(&self.collection));
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    pub fn subscribe(&self, subscriber: Rc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    pub fn unsubscribe(&self, subscriber: &Rc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    pub fn subscribe_batched(&self, subscriber: Rc<dyn BatchedCollectionSubscriber>) -> bool {
        self.batched_subscribers.add(subscriber)
    }

    pub fn unsubscribe_batched(&self, subscriber: &Rc<dyn BatchedCollectionSubscriber>) -> bool {
        self.batched_subscribers.remove(subscriber)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty() || !self.batched_subscribers.is_empty()
    }

    /// Observer for `length` (arrays) or `size` (maps, sets).
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        if let Some(observer) = self.length_observer.borrow().as_ref() {
            return observer.clone();
        }
        let observer = Rc::new(CollectionLengthObserver {
            kind: self.kind,
            collection: self.collection.clone(),
            current_value: Cell::new(live_len(&self.collection)),
            subscribers: SubscriberRegistry::new(),
        });
        *self.length_observer.borrow_mut() = Some(observer.clone());
        observer
    }

    // =========================================================================
    // NOTIFICATION
    // =========================================================================

    /// Report one instrumented mutation.
    pub(crate) fn notify(&self, kind: MutationKind) {
        tracing::trace!(collection = ?self.kind, mutation = ?kind, "collection mutated");
        self.subscribers
            .broadcast(|s| s.handle_collection_change(kind, IS_COLLECTION_MUTATION));
        if let Some(this) = self.self_weak.upgrade() {
            self.lifecycle.enqueue_flush(this);
        }
    }
}

impl Flushable for CollectionObserver {
    fn flush(&self, flags: u32) {
        // Reset before delivery: subscribers that mutate again land in the next map
        let index_map = self.index_map();
        self.reset_index_map();
        self.batched_subscribers
            .broadcast(|s| s.handle_batched_change(&index_map, flags | UPDATE_TARGET_INSTANCE));
        let length_observer = self.length_observer.borrow().clone();
        if let Some(observer) = length_observer {
            observer.patch(flags | UPDATE_TARGET_INSTANCE);
        }
    }
}

// =============================================================================
// LENGTH OBSERVER
// =============================================================================

/// Observes the element count of a collection.
///
/// Updated when the owning collection observer flushes. Writing `length` on an
/// array truncates or pads it; `size` of maps and sets is read-only.
pub struct CollectionLengthObserver {
    kind: CollectionKind,
    collection: WeakTarget,
    current_value: Cell<usize>,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
}

impl CollectionLengthObserver {
    /// Re-read the count and notify on change.
    pub fn patch(&self, flags: u32) {
        let new = live_len(&self.collection);
        let old = self.current_value.replace(new);
        if old != new {
            let (new, old) = (Value::from(new), Value::from(old));
            self.subscribers.broadcast(|s| s.handle_change(&new, &old, flags));
        }
    }
}

impl Accessor for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(live_len(&self.collection))
    }

    fn set_value(&self, value: Value, _flags: u32) {
        let Some(Value::Array(array)) = self.collection.upgrade() else {
            tracing::trace!(collection = ?self.kind, "size is read-only");
            return;
        };
        let len = value.to_number();
        if len.is_finite() && len >= 0.0 {
            array.set_length(len as usize);
        }
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        if self.subscribers.is_empty() {
            self.current_value.set(live_len(&self.collection));
        }
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn PropertySubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    fn as_accessor(self: Rc<Self>) -> Rc<dyn Accessor> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
