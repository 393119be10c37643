// ============================================================================
// spark-observe - Computed Observer
// Observe getter-defined properties through their collected dependencies
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::locator::ObserverLocator;
use super::subscribers::SubscriberRegistry;
use crate::collections::index_map::IndexMap;
use crate::collections::observer::CollectionObserver;
use crate::core::constants::{NONE, UPDATE_TARGET_INSTANCE};
use crate::core::context::{collect_dependencies, untrack};
use crate::core::object::{AccessorProperty, ObjectRef, WeakObjectRef};
use crate::core::types::{
    same_rc, Accessor, BatchedCollectionSubscriber, DependencyCollector, PropertyObserver,
    PropertySubscriber,
};
use crate::core::value::Value;

// =============================================================================
// DEPENDENCY RECORDER
// =============================================================================

/// Reads made by one getter run.
#[derive(Default)]
struct DependencyRecorder {
    properties: RefCell<Vec<(Value, Rc<str>)>>,
    collections: RefCell<Vec<Value>>,
}

impl DependencyCollector for DependencyRecorder {
    fn collect_property(&self, target: &Value, key: &str) {
        self.properties.borrow_mut().push((target.clone(), Rc::from(key)));
    }

    fn collect_collection(&self, target: &Value) {
        self.collections.borrow_mut().push(target.clone());
    }
}

// =============================================================================
// COMPUTED OBSERVER
// =============================================================================

/// Observes a getter by running it under a dependency collector.
///
/// While at least one subscriber is attached, the observer is subscribed to
/// every property and collection the getter read during its last run. Any
/// dependency change re-runs the getter (re-collecting dependencies unless the
/// property is marked static) and notifies when the result differs.
pub struct ComputedObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    descriptor: Rc<AccessorProperty>,
    locator: Weak<ObserverLocator>,
    current_value: RefCell<Value>,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
    property_deps: RefCell<Vec<Rc<dyn PropertyObserver>>>,
    collection_deps: RefCell<Vec<Rc<CollectionObserver>>>,
    self_weak: Weak<ComputedObserver>,
}

impl ComputedObserver {
    pub fn new(
        object: &ObjectRef,
        key: &str,
        descriptor: Rc<AccessorProperty>,
        locator: Weak<ObserverLocator>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            descriptor,
            locator,
            current_value: RefCell::new(Value::Undefined),
            subscribers: SubscriberRegistry::new(),
            property_deps: RefCell::new(Vec::new()),
            collection_deps: RefCell::new(Vec::new()),
            self_weak: self_weak.clone(),
        })
    }

    /// Number of observed dependencies (properties and collections).
    pub fn dependency_count(&self) -> usize {
        self.property_deps.borrow().len() + self.collection_deps.borrow().len()
    }

    fn get_value_and_collect(&self, require_collect: bool) -> Value {
        let (Some(object), Some(getter)) = (self.object.upgrade(), self.descriptor.getter.clone())
        else {
            return Value::Undefined;
        };

        let value = if self.descriptor.overrides.is_static && !require_collect {
            untrack(|| getter(&object))
        } else {
            self.unsubscribe_all_dependencies();
            let recorder = Rc::new(DependencyRecorder::default());
            let value = collect_dependencies(recorder.clone(), || getter(&object));
            self.subscribe_dependencies(&recorder);
            value
        };

        *self.current_value.borrow_mut() = value.clone();
        value
    }

    fn subscribe_dependencies(&self, recorder: &DependencyRecorder) {
        let (Some(locator), Some(this)) = (self.locator.upgrade(), self.self_weak.upgrade()) else {
            return;
        };
        let as_property: Rc<dyn PropertySubscriber> = this.clone();
        let as_batched: Rc<dyn BatchedCollectionSubscriber> = this;

        for (target, key) in recorder.properties.take() {
            match locator.get_observer(NONE, &target, &key) {
                Ok(observer) => {
                    if self.property_deps.borrow().iter().any(|d| same_rc(d, &observer)) {
                        continue;
                    }
                    observer.subscribe(as_property.clone());
                    self.property_deps.borrow_mut().push(observer);
                }
                Err(err) => {
                    tracing::warn!(%err, computed = %self.key, "computed dependency is not observable");
                }
            }
        }

        for target in recorder.collections.take() {
            let Some(observer) = locator.collection_observer(&target) else {
                continue;
            };
            if self.collection_deps.borrow().iter().any(|d| Rc::ptr_eq(d, &observer)) {
                continue;
            }
            observer.subscribe_batched(as_batched.clone());
            self.collection_deps.borrow_mut().push(observer);
        }

        tracing::trace!(
            computed = %self.key,
            dependencies = self.dependency_count(),
            "computed dependencies collected"
        );
    }

    fn unsubscribe_all_dependencies(&self) {
        let Some(this) = self.self_weak.upgrade() else {
            return;
        };
        let as_property: Rc<dyn PropertySubscriber> = this.clone();
        let as_batched: Rc<dyn BatchedCollectionSubscriber> = this;

        let properties = self.property_deps.take();
        for observer in properties {
            observer.unsubscribe(&as_property);
        }
        let collections = self.collection_deps.take();
        for observer in collections {
            observer.unsubscribe_batched(&as_batched);
        }
    }

    fn refresh(&self) {
        let old = self.current_value.borrow().clone();
        let new = self.get_value_and_collect(false);
        if old != new {
            self.subscribers
                .broadcast(|s| s.handle_change(&new, &old, UPDATE_TARGET_INSTANCE));
        }
    }
}

impl Accessor for ComputedObserver {
    fn get_value(&self) -> Value {
        let (Some(object), Some(getter)) = (self.object.upgrade(), self.descriptor.getter.clone())
        else {
            return Value::Undefined;
        };
        let value = untrack(|| getter(&object));
        *self.current_value.borrow_mut() = value.clone();
        value
    }

    fn set_value(&self, value: Value, _flags: u32) {
        match (&self.descriptor.setter, self.object.upgrade()) {
            (Some(setter), Some(object)) => setter(&object, value),
            _ => tracing::trace!(key = %self.key, "computed property has no setter"),
        }
    }
}

impl PropertySubscriber for ComputedObserver {
    fn handle_change(&self, _new_value: &Value, _old_value: &Value, _flags: u32) {
        self.refresh();
    }
}

impl BatchedCollectionSubscriber for ComputedObserver {
    fn handle_batched_change(&self, _index_map: &IndexMap, _flags: u32) {
        self.refresh();
    }
}

impl PropertyObserver for ComputedObserver {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        let added = self.subscribers.add(subscriber);
        if added && self.subscribers.len() == 1 {
            self.get_value_and_collect(true);
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn PropertySubscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && self.subscribers.is_empty() {
            self.unsubscribe_all_dependencies();
        }
        removed
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

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::array::ObservableArray;
    use crate::config::RuntimeConfig;
    use crate::core::object::ComputedOverrides;
    use crate::lifecycle::Lifecycle;
    use std::cell::Cell;

    struct Count(Cell<u32>, RefCell<Value>);

    impl PropertySubscriber for Count {
        fn handle_change(&self, new_value: &Value, _old: &Value, _flags: u32) {
            self.0.set(self.0.get() + 1);
            *self.1.borrow_mut() = new_value.clone();
        }
    }

    fn count() -> Rc<Count> {
        Rc::new(Count(Cell::new(0), RefCell::new(Value::Undefined)))
    }

    fn locator() -> Rc<ObserverLocator> {
        ObserverLocator::new(Lifecycle::new(), &RuntimeConfig::default())
    }

    fn person() -> ObjectRef {
        let obj = ObjectRef::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
        obj.define_accessor(
            "full",
            AccessorProperty::getter(|o| Value::from(format!("{} {}", o.get("first"), o.get("last")))),
        );
        obj
    }

    #[test]
    fn getter_is_classified_as_computed() {
        let locator = locator();
        let obj = person();
        let observer = locator.get_observer(NONE, &Value::from(obj), "full").unwrap();
        assert!(observer.as_any().is::<ComputedObserver>());
    }

    #[test]
    fn dependency_change_notifies() {
        let locator = locator();
        let obj = person();
        let observer = locator.get_observer(NONE, &Value::from(obj.clone()), "full").unwrap();
        let sub = count();
        observer.subscribe(sub.clone());

        obj.set("first", Value::from("Grace"));
        assert_eq!(sub.0.get(), 1);
        assert_eq!(*sub.1.borrow(), Value::from("Grace Lovelace"));

        obj.set("first", Value::from("Grace"));
        assert_eq!(sub.0.get(), 1);
    }

    #[test]
    fn last_unsubscribe_releases_dependencies() {
        let locator = locator();
        let obj = person();
        let observer = locator.get_observer(NONE, &Value::from(obj.clone()), "full").unwrap();
        let sub = count();
        observer.subscribe(sub.clone());
        let computed = observer.as_any().downcast_ref::<ComputedObserver>().unwrap();
        assert_eq!(computed.dependency_count(), 2);

        let sub_dyn: Rc<dyn PropertySubscriber> = sub.clone();
        assert!(observer.unsubscribe(&sub_dyn));
        assert_eq!(computed.dependency_count(), 0);
        obj.set("first", Value::from("Grace"));
        assert_eq!(sub.0.get(), 0);
    }

    #[test]
    fn branch_dependencies_are_recollected() {
        let locator = locator();
        let obj = ObjectRef::from_pairs([("useA", true)]);
        obj.set("a", Value::from(1));
        obj.set("b", Value::from(2));
        obj.define_accessor(
            "pick",
            AccessorProperty::getter(|o| {
                if o.get("useA").is_truthy() { o.get("a") } else { o.get("b") }
            }),
        );
        let observer = locator.get_observer(NONE, &Value::from(obj.clone()), "pick").unwrap();
        let sub = count();
        observer.subscribe(sub.clone());

        obj.set("useA", Value::from(false));
        assert_eq!(*sub.1.borrow(), Value::from(2));
        obj.set("a", Value::from(10));
        assert_eq!(sub.0.get(), 1);
        obj.set("b", Value::from(20));
        assert_eq!(sub.0.get(), 2);
    }

    #[test]
    fn static_overrides_keep_first_dependencies() {
        let locator = locator();
        let obj = ObjectRef::from_pairs([("useA", true)]);
        obj.set("a", Value::from(1));
        obj.set("b", Value::from(2));
        obj.define_accessor(
            "pick",
            AccessorProperty::getter(|o| {
                if o.get("useA").is_truthy() { o.get("a") } else { o.get("b") }
            })
            .with_overrides(ComputedOverrides { is_static: true, volatile: false }),
        );
        let observer = locator.get_observer(NONE, &Value::from(obj.clone()), "pick").unwrap();
        let sub = count();
        observer.subscribe(sub.clone());

        obj.set("useA", Value::from(false));
        assert_eq!(sub.0.get(), 1);
        obj.set("b", Value::from(20));
        assert_eq!(sub.0.get(), 1);
    }

    #[test]
    fn collection_reads_subscribe_batched() {
        let locator = locator();
        let items = ObservableArray::from_vec(vec![Value::from(1), Value::from(2)]);
        let obj = ObjectRef::from_pairs([("items", Value::from(items.clone()))]);
        obj.define_accessor(
            "total",
            AccessorProperty::getter(|o| match o.get("items") {
                Value::Array(a) => Value::from(a.to_vec().iter().map(Value::to_number).sum::<f64>()),
                _ => Value::Undefined,
            }),
        );
        let observer = locator.get_observer(NONE, &Value::from(obj), "total").unwrap();
        let sub = count();
        observer.subscribe(sub.clone());

        items.push(Value::from(3));
        assert_eq!(sub.0.get(), 0);
        locator.lifecycle().process_flush_queue(NONE);
        assert_eq!(sub.0.get(), 1);
        assert_eq!(*sub.1.borrow(), Value::from(6));
    }
}
