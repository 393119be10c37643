// ============================================================================
// spark-observe - ObservableArray
// A shared array whose mutators report to a collection observer
// ============================================================================

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use super::index_map::NEW_ITEM;
use super::observer::CollectionObserver;
use crate::core::context::{is_array_observation_enabled, track_collection_read};
use crate::core::types::MutationKind;
use crate::core::value::Value;
use crate::observation::cache::ObserverCache;

pub struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<CollectionObserver>>>,
    observers: ObserverCache,
}

/// Shared, observable array of values.
///
/// Clones share storage. Mutators report to the array's collection observer
/// (if one was created and array observation is enabled): each updates the
/// index map, sends one immediate notification, and enqueues a flush.
///
/// # Example
///
/// ```
/// use spark_observe::{ObservableArray, Value};
///
/// let items = ObservableArray::from_vec(vec![Value::from(1), Value::from(2), Value::from(3)]);
/// let removed = items.splice(1, 1, vec![Value::from(9), Value::from(9)]);
///
/// assert_eq!(removed, vec![Value::from(2)]);
/// assert_eq!(items.len(), 4);
/// ```
#[derive(Clone)]
pub struct ObservableArray {
    inner: Rc<ArrayInner>,
}

impl ObservableArray {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                observers: ObserverCache::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ArrayInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }

    pub fn ptr_eq(&self, other: &ObservableArray) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observers(&self) -> &ObserverCache {
        &self.inner.observers
    }

    /// The collection observer, once the observer locator created one.
    pub fn observer(&self) -> Option<Rc<CollectionObserver>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn set_observer(&self, observer: Rc<CollectionObserver>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    fn instrumented(&self) -> Option<Rc<CollectionObserver>> {
        if !is_array_observation_enabled() {
            return None;
        }
        self.observer()
    }

    fn track(&self) {
        track_collection_read(|| Value::Array(self.clone()));
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.track();
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.to_vec_untracked()
    }

    pub(crate) fn to_vec_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.track();
        self.inner.items.borrow().contains(value)
    }

    // =========================================================================
    // MUTATORS
    // =========================================================================

    /// Append one item, returning the new length.
    pub fn push(&self, value: Value) -> usize {
        self.extend(std::iter::once(value))
    }

    /// Append items, returning the new length.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let observer = self.instrumented();
        let (added, len) = {
            let mut items = self.inner.items.borrow_mut();
            let before = items.len();
            items.extend(values);
            (items.len() - before, items.len())
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.push_new(added));
            observer.notify(MutationKind::Push);
        }
        len
    }

    pub fn pop(&self) -> Option<Value> {
        let observer = self.instrumented();
        let value = self.inner.items.borrow_mut().pop()?;
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.pop());
            observer.notify(MutationKind::Pop);
        }
        Some(value)
    }

    pub fn shift(&self) -> Option<Value> {
        let observer = self.instrumented();
        let value = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                return None;
            }
            items.remove(0)
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.shift());
            observer.notify(MutationKind::Shift);
        }
        Some(value)
    }

    /// Prepend items, returning the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        let observer = self.instrumented();
        let count = values.len();
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.splice(0..0, values);
            items.len()
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.unshift_new(count));
            observer.notify(MutationKind::Unshift);
        }
        len
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    /// Out-of-range arguments are clamped. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        let observer = self.instrumented();
        let insert_count = values.len();
        let (start, removed) = {
            let mut items = self.inner.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, values).collect();
            (start, removed)
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.splice(start, removed.len(), insert_count));
            observer.notify(MutationKind::Splice);
        }
        removed
    }

    pub fn reverse(&self) {
        let observer = self.instrumented();
        self.inner.items.borrow_mut().reverse();
        if let Some(observer) = observer {
            observer.with_index_map(|map| map.reverse());
            observer.notify(MutationKind::Reverse);
        }
    }

    /// Sort with the default ordering (numbers numerically, the rest by
    /// display string).
    pub fn sort(&self) {
        self.sort_by(Value::compare_default);
    }

    /// Stable sort. The index map follows each item to its new slot.
    ///
    /// `compare` runs on a copy, so it may read the array; the array is only
    /// written once sorting has finished.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let observer = self.instrumented();
        let items = self.inner.items.borrow().clone();
        let Some(observer) = observer else {
            let mut items = items;
            items.sort_by(compare);
            *self.inner.items.borrow_mut() = items;
            return;
        };

        let mut entries = observer.index_map().entries;
        entries.resize(items.len(), NEW_ITEM);
        let mut pairs: Vec<(Value, i32)> = items.into_iter().zip(entries).collect();
        pairs.sort_by(|a, b| compare(&a.0, &b.0));
        let (items, entries): (Vec<Value>, Vec<i32>) = pairs.into_iter().unzip();

        *self.inner.items.borrow_mut() = items;
        observer.with_index_map(|map| map.entries = entries);
        observer.notify(MutationKind::Sort);
    }

    /// Indexed write. Writing past the end pads with `undefined`.
    /// Writing a value equal to the current one is not a mutation.
    pub fn set(&self, index: usize, value: Value) {
        let observer = self.instrumented();
        let appended = {
            let mut items = self.inner.items.borrow_mut();
            if let Some(slot) = items.get_mut(index) {
                if *slot == value {
                    return;
                }
                *slot = value;
                None
            } else {
                let before = items.len();
                items.resize(index, Value::Undefined);
                items.push(value);
                Some(items.len() - before)
            }
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| match appended {
                Some(count) => map.push_new(count),
                None => map.replace(index),
            });
            observer.notify(MutationKind::Assign);
        }
    }

    /// Truncate or pad with `undefined`.
    pub fn set_length(&self, len: usize) {
        let observer = self.instrumented();
        let before = {
            let mut items = self.inner.items.borrow_mut();
            let before = items.len();
            if before == len {
                return;
            }
            items.resize(len, Value::Undefined);
            before
        };
        if let Some(observer) = observer {
            observer.with_index_map(|map| {
                if len < before {
                    map.truncate(len);
                } else {
                    map.push_new(len - before);
                }
            });
            observer.notify(MutationKind::Truncate);
        }
    }
}

impl Default for ObservableArray {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ObservableArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::index_map::IndexMap;
    use crate::config::RuntimeConfig;
    use crate::core::constants::NONE;
    use crate::core::context::{disable_array_observation, enable_array_observation};
    use crate::core::types::{BatchedCollectionSubscriber, CollectionSubscriber};
    use crate::lifecycle::Lifecycle;
    use crate::observation::locator::ObserverLocator;
    use std::cell::Cell;

    fn nums(values: &[i32]) -> Vec<Value> {
        values.iter().map(|&n| Value::from(n)).collect()
    }

    fn observed(values: &[i32]) -> (ObservableArray, Rc<CollectionObserver>, Rc<Lifecycle>) {
        let lifecycle = Lifecycle::new();
        let locator = ObserverLocator::new(lifecycle.clone(), &RuntimeConfig::default());
        let array = ObservableArray::from_vec(nums(values));
        let observer = locator.get_array_observer(&array);
        (array, observer, lifecycle)
    }

    #[derive(Default)]
    struct Log {
        immediate: RefCell<Vec<MutationKind>>,
        batched: RefCell<Vec<IndexMap>>,
    }

    impl CollectionSubscriber for Log {
        fn handle_collection_change(&self, kind: MutationKind, _flags: u32) {
            self.immediate.borrow_mut().push(kind);
        }
    }

    impl BatchedCollectionSubscriber for Log {
        fn handle_batched_change(&self, index_map: &IndexMap, _flags: u32) {
            self.batched.borrow_mut().push(index_map.clone());
        }
    }

    #[test]
    fn splice_scenario() {
        let (array, observer, _lifecycle) = observed(&[1, 2, 3]);
        array.splice(1, 1, nums(&[9, 9]));
        let map = observer.index_map();
        assert_eq!(map.entries, vec![0, NEW_ITEM, NEW_ITEM, 2]);
        assert_eq!(map.deleted_items, vec![1]);
        assert_eq!(array.to_vec(), nums(&[1, 9, 9, 3]));
    }

    #[test]
    fn immediate_and_batched_channels() {
        let (array, observer, lifecycle) = observed(&[1]);
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());
        observer.subscribe_batched(log.clone());

        array.push(Value::from(2));
        array.push(Value::from(3));
        array.pop();
        assert_eq!(
            *log.immediate.borrow(),
            vec![MutationKind::Push, MutationKind::Push, MutationKind::Pop]
        );
        assert!(log.batched.borrow().is_empty());

        lifecycle.process_flush_queue(NONE);
        let batched = log.batched.borrow();
        assert_eq!(batched.len(), 1);
        assert_eq!(batched[0].entries, vec![0, NEW_ITEM]);
        assert!(observer.index_map().is_identity());
        assert_eq!(observer.index_map().len(), 2);
    }

    #[test]
    fn mutation_during_delivery_reaches_the_next_flush() {
        struct PushOnce {
            array: ObservableArray,
            maps: RefCell<Vec<IndexMap>>,
        }
        impl BatchedCollectionSubscriber for PushOnce {
            fn handle_batched_change(&self, index_map: &IndexMap, _flags: u32) {
                self.maps.borrow_mut().push(index_map.clone());
                if self.maps.borrow().len() == 1 {
                    self.array.push(Value::from(3));
                }
            }
        }

        let (array, observer, lifecycle) = observed(&[1]);
        let subscriber = Rc::new(PushOnce {
            array: array.clone(),
            maps: RefCell::new(Vec::new()),
        });
        observer.subscribe_batched(subscriber.clone());

        array.push(Value::from(2));
        lifecycle.process_flush_queue(NONE);

        let maps = subscriber.maps.borrow();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].entries, vec![0, NEW_ITEM]);
        assert_eq!(maps[1].entries, vec![0, 1, NEW_ITEM]);
        assert!(observer.index_map().is_identity());
    }

    #[test]
    fn comparator_may_read_the_array() {
        let plain = ObservableArray::from_vec(nums(&[2, 1]));
        let reader = plain.clone();
        plain.sort_by(|a, b| {
            assert_eq!(reader.len(), 2);
            Value::compare_default(a, b)
        });
        assert_eq!(plain.to_vec(), nums(&[1, 2]));

        let (array, observer, _lifecycle) = observed(&[2, 1]);
        let reader = array.clone();
        array.sort_by(|a, b| {
            assert_eq!(reader.len(), 2);
            Value::compare_default(a, b)
        });
        assert_eq!(array.to_vec(), nums(&[1, 2]));
        assert_eq!(observer.index_map().entries, vec![1, 0]);
    }

    #[test]
    fn panicking_comparator_leaves_array_intact() {
        let (array, observer, _lifecycle) = observed(&[3, 1, 2]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            array.sort_by(|_, _| panic!("comparator failed"));
        }));
        assert!(result.is_err());
        assert_eq!(array.to_vec(), nums(&[3, 1, 2]));
        assert!(observer.index_map().is_identity());
        assert_eq!(observer.index_map().len(), 3);
    }

    #[test]
    fn sort_moves_index_map_entries() {
        let (array, observer, _lifecycle) = observed(&[3, 1, 2]);
        array.sort();
        assert_eq!(array.to_vec(), nums(&[1, 2, 3]));
        assert_eq!(observer.index_map().entries, vec![1, 2, 0]);
    }

    #[test]
    fn reverse_shift_unshift() {
        let (array, observer, _lifecycle) = observed(&[1, 2, 3]);
        array.reverse();
        assert_eq!(observer.index_map().entries, vec![2, 1, 0]);
        assert_eq!(array.shift(), Some(Value::from(3)));
        array.unshift(nums(&[7]));
        let map = observer.index_map();
        assert_eq!(map.entries, vec![NEW_ITEM, 1, 0]);
        assert_eq!(map.deleted_items, vec![2]);
    }

    #[test]
    fn indexed_write_and_length() {
        let (array, observer, _lifecycle) = observed(&[1, 2]);
        array.set(0, Value::from(1));
        assert!(observer.index_map().is_identity());

        array.set(1, Value::from(5));
        assert_eq!(observer.index_map().entries, vec![0, NEW_ITEM]);

        array.set(3, Value::from(8));
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(2), Some(Value::Undefined));

        array.set_length(1);
        let map = observer.index_map();
        assert_eq!(map.entries, vec![0]);
        assert_eq!(map.deleted_items, vec![1]);
    }

    #[test]
    fn empty_pops_are_not_mutations() {
        let (array, observer, lifecycle) = observed(&[]);
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());
        assert_eq!(array.pop(), None);
        assert_eq!(array.shift(), None);
        assert!(log.immediate.borrow().is_empty());
        assert_eq!(lifecycle.pending(crate::lifecycle::Queue::Flush), 0);
    }

    #[test]
    fn disabled_instrumentation_is_silent() {
        let (array, observer, lifecycle) = observed(&[1]);
        let hits = Rc::new(Cell::new(0));
        struct Hit(Rc<Cell<u32>>);
        impl CollectionSubscriber for Hit {
            fn handle_collection_change(&self, _kind: MutationKind, _flags: u32) {
                self.0.set(self.0.get() + 1);
            }
        }
        observer.subscribe(Rc::new(Hit(hits.clone())));

        disable_array_observation();
        array.push(Value::from(2));
        enable_array_observation();
        assert_eq!(hits.get(), 0);
        assert_eq!(lifecycle.pending(crate::lifecycle::Queue::Flush), 0);

        array.push(Value::from(3));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unobserved_arrays_mutate_plainly() {
        let array = ObservableArray::from_vec(nums(&[2, 1]));
        array.sort();
        array.push(Value::from(3));
        assert_eq!(array.to_vec(), nums(&[1, 2, 3]));
        assert!(array.observer().is_none());
    }
}
