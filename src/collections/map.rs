// ============================================================================
// spark-observe - ObservableMap
// An insertion-ordered shared map whose mutators report to an observer
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap as OrderedMap;

use super::observer::CollectionObserver;
use crate::core::context::{is_map_observation_enabled, track_collection_read};
use crate::core::types::MutationKind;
use crate::core::value::Value;
use crate::observation::cache::ObserverCache;

pub struct MapInner {
    entries: RefCell<OrderedMap<Value, Value>>,
    observer: RefCell<Option<Rc<CollectionObserver>>>,
    observers: ObserverCache,
}

/// Shared, observable map keyed by [`Value`] (SameValueZero keys).
///
/// Index-map slots follow insertion order.
#[derive(Clone)]
pub struct ObservableMap {
    inner: Rc<MapInner>,
}

impl ObservableMap {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(OrderedMap::new()),
                observer: RefCell::new(None),
                observers: ObserverCache::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<MapInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<MapInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }

    pub fn observers(&self) -> &ObserverCache {
        &self.inner.observers
    }

    pub fn observer(&self) -> Option<Rc<CollectionObserver>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn set_observer(&self, observer: Rc<CollectionObserver>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    fn instrumented(&self) -> Option<Rc<CollectionObserver>> {
        if !is_map_observation_enabled() {
            return None;
        }
        self.observer()
    }

    fn track(&self) {
        track_collection_read(|| Value::Map(self.clone()));
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.track();
        self.inner.entries.borrow().get(key).cloned()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.track();
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Value> {
        self.track();
        self.inner.entries.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track();
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // =========================================================================
    // MUTATORS
    // =========================================================================

    /// Insert or replace. Replacing with an equal value is not a mutation.
    pub fn set(&self, key: Value, value: Value) {
        let observer = self.instrumented();
        let replaced_at = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_full_mut(&key) {
                Some((index, _, current)) => {
                    if *current == value {
                        return;
                    }
                    *current = value;
                    Some(index)
                }
                None => {
                    entries.insert(key, value);
                    None
                }
            }
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| match replaced_at {
                Some(index) => map.replace(index),
                None => map.push_new(1),
            });
            observer.notify(MutationKind::Set);
        }
    }

    pub fn delete(&self, key: &Value) -> bool {
        let observer = self.instrumented();
        let removed = self.inner.entries.borrow_mut().shift_remove_full(key);
        let Some((index, _, _)) = removed else {
            return false;
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.remove(index));
            observer.notify(MutationKind::Delete);
        }
        true
    }

    pub fn clear(&self) {
        let observer = self.instrumented();
        {
            let mut entries = self.inner.entries.borrow_mut();
            if entries.is_empty() {
                return;
            }
            entries.clear();
        }
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.clear());
            observer.notify(MutationKind::Clear);
        }
    }
}

impl Default for ObservableMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Value, Value)> for ObservableMap {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let map = Self::new();
        map.inner.entries.borrow_mut().extend(iter);
        map
    }
}

// =============================================================================
// TESTS
// =============================================================================
