// ============================================================================
// spark-observe - ObservableSet
// An insertion-ordered shared set whose mutators report to an observer
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use super::observer::CollectionObserver;
use crate::core::context::{is_set_observation_enabled, track_collection_read};
use crate::core::types::MutationKind;
use crate::core::value::Value;
use crate::observation::cache::ObserverCache;

pub struct SetInner {
    values: RefCell<IndexSet<Value>>,
    observer: RefCell<Option<Rc<CollectionObserver>>>,
    observers: ObserverCache,
}

/// Shared, observable set of [`Value`]s (SameValueZero membership).
#[derive(Clone)]
pub struct ObservableSet {
    inner: Rc<SetInner>,
}

impl ObservableSet {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SetInner {
                values: RefCell::new(IndexSet::new()),
                observer: RefCell::new(None),
                observers: ObserverCache::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<SetInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SetInner> {
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
        if !is_set_observation_enabled() {
            return None;
        }
        self.observer()
    }

    fn track(&self) {
        track_collection_read(|| Value::Set(self.clone()));
    }

    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, value: &Value) -> bool {
        self.track();
        self.inner.values.borrow().contains(value)
    }

    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.inner.values.borrow().iter().cloned().collect()
    }

    /// Insert a value. Returns false (and reports nothing) if already present.
    pub fn add(&self, value: Value) -> bool {
        let observer = self.instrumented();
        if !self.inner.values.borrow_mut().insert(value) {
            return false;
        }
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.push_new(1));
            observer.notify(MutationKind::Add);
        }
        true
    }

    pub fn delete(&self, value: &Value) -> bool {
        let observer = self.instrumented();
        let removed = self.inner.values.borrow_mut().shift_remove_full(value);
        let Some((index, _)) = removed else {
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
            let mut values = self.inner.values.borrow_mut();
            if values.is_empty() {
                return;
            }
            values.clear();
        }
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.clear());
            observer.notify(MutationKind::Clear);
        }
    }
}

impl Default for ObservableSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ObservableSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let set = Self::new();
        set.inner.values.borrow_mut().extend(iter);
        set
    }
}
