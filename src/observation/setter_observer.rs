// ============================================================================
// spark-observe - Setter Observers
// Observe plain and setter-backed object properties by interception
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::subscribers::SubscriberRegistry;
use crate::core::constants::{PERSISTENT_BINDING_FLAGS, UPDATE_TARGET_INSTANCE};
use crate::core::object::{AccessorProperty, ObjectRef, WeakObjectRef};
use crate::core::types::{Accessor, Interceptor, PropertyObserver, PropertySubscriber};
use crate::core::value::Value;

// =============================================================================
// SETTER OBSERVER
// =============================================================================

/// Observes a data property.
///
/// On first subscribe the property is replaced by an interceptor, after which
/// the observer holds the authoritative value and every write goes through
/// [`Accessor::set_value`]. Writes of a value equal to the current one are
/// dropped.
pub struct SetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    current_value: RefCell<Value>,
    previous_value: RefCell<Value>,
    observing: Cell<bool>,
    persistent_flags: u32,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
    self_weak: Weak<SetterObserver>,
}

impl SetterObserver {
    pub fn new(flags: u32, object: &ObjectRef, key: &str) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            current_value: RefCell::new(Value::Undefined),
            previous_value: RefCell::new(Value::Undefined),
            observing: Cell::new(false),
            persistent_flags: flags & PERSISTENT_BINDING_FLAGS,
            subscribers: SubscriberRegistry::new(),
            self_weak: self_weak.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the property has been intercepted.
    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }

    /// Value held before the last change.
    pub fn previous_value(&self) -> Value {
        self.previous_value.borrow().clone()
    }

    fn start_observing(&self) {
        let (Some(object), Some(this)) = (self.object.upgrade(), self.self_weak.upgrade()) else {
            return;
        };
        self.observing.set(true);
        *self.current_value.borrow_mut() = object.get_untracked(&self.key);
        object.intercept(&self.key, this);
        tracing::trace!(key = %self.key, "setter observer intercepting property");
    }
}

impl Accessor for SetterObserver {
    fn get_value(&self) -> Value {
        if self.observing.get() {
            return self.current_value.borrow().clone();
        }
        self.object
            .upgrade()
            .map(|object| object.get_untracked(&self.key))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value, flags: u32) {
        if !self.observing.get() {
            if let Some(object) = self.object.upgrade() {
                object.set(&self.key, value);
            }
            return;
        }
        let old = self.current_value.replace(value.clone());
        if old == value {
            return;
        }
        *self.previous_value.borrow_mut() = old.clone();
        let flags = flags | self.persistent_flags;
        self.subscribers.broadcast(|s| s.handle_change(&value, &old, flags));
    }
}

impl Interceptor for SetterObserver {
    fn get(&self) -> Value {
        self.current_value.borrow().clone()
    }

    fn set(&self, value: Value) {
        self.set_value(value, UPDATE_TARGET_INSTANCE);
    }
}

impl PropertyObserver for SetterObserver {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        if !self.observing.get() {
            self.start_observing();
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

// =============================================================================
// CUSTOM SETTER OBSERVER
// =============================================================================

/// Observes a getter/setter property whose dependencies are not tracked.
///
/// Writes still run the original setter. The observer compares the written
/// value against the last one it saw and notifies on change.
pub struct CustomSetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    descriptor: Rc<AccessorProperty>,
    current_value: RefCell<Value>,
    observing: Cell<bool>,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
    self_weak: Weak<CustomSetterObserver>,
}

impl CustomSetterObserver {
    pub fn new(object: &ObjectRef, key: &str, descriptor: Rc<AccessorProperty>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            descriptor,
            current_value: RefCell::new(Value::Undefined),
            observing: Cell::new(false),
            subscribers: SubscriberRegistry::new(),
            self_weak: self_weak.clone(),
        })
    }

    fn read(&self, object: &ObjectRef) -> Value {
        match &self.descriptor.getter {
            Some(getter) => getter(object),
            None => Value::Undefined,
        }
    }

    fn convert_property(&self) {
        let (Some(object), Some(this)) = (self.object.upgrade(), self.self_weak.upgrade()) else {
            return;
        };
        self.observing.set(true);
        *self.current_value.borrow_mut() = self.read(&object);
        object.intercept(&self.key, this);
    }
}

impl Accessor for CustomSetterObserver {
    fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map(|object| object.get_untracked(&self.key))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value, _flags: u32) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.key, value);
        }
    }
}

impl Interceptor for CustomSetterObserver {
    fn get(&self) -> Value {
        self.object.upgrade().map(|object| self.read(&object)).unwrap_or_default()
    }

    fn set(&self, value: Value) {
        let Some(object) = self.object.upgrade() else {
            return;
        };
        if let Some(setter) = &self.descriptor.setter {
            setter(&object, value.clone());
        }
        let old = self.current_value.replace(value.clone());
        if old != value {
            self.subscribers
                .broadcast(|s| s.handle_change(&value, &old, UPDATE_TARGET_INSTANCE));
        }
    }
}

impl PropertyObserver for CustomSetterObserver {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        if !self.observing.get() {
            self.convert_property();
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

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{NONE, PROXY_STRATEGY};

    #[derive(Default)]
    struct Log {
        changes: RefCell<Vec<(Value, Value, u32)>>,
    }

    impl PropertySubscriber for Log {
        fn handle_change(&self, new_value: &Value, old_value: &Value, flags: u32) {
            self.changes
                .borrow_mut()
                .push((new_value.clone(), old_value.clone(), flags));
        }
    }

    #[test]
    fn unobserved_writes_pass_through() {
        let obj = ObjectRef::from_pairs([("x", 1)]);
        let observer = SetterObserver::new(NONE, &obj, "x");
        observer.set_value(Value::from(2), NONE);
        assert!(!observer.is_observing());
        assert_eq!(obj.get("x"), Value::from(2));
    }

    #[test]
    fn equal_writes_are_dropped() {
        let obj = ObjectRef::from_pairs([("x", 0)]);
        let observer = SetterObserver::new(NONE, &obj, "x");
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());

        obj.set("x", Value::from(5));
        obj.set("x", Value::from(5));

        let changes = log.changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, Value::from(5));
        assert_eq!(changes[0].1, Value::from(0));
        assert_eq!(observer.previous_value(), Value::from(0));
    }

    #[test]
    fn persistent_flags_ride_along() {
        let obj = ObjectRef::from_pairs([("x", 0)]);
        let observer = SetterObserver::new(PROXY_STRATEGY | UPDATE_TARGET_INSTANCE, &obj, "x");
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());
        observer.set_value(Value::from(1), NONE);
        assert_eq!(log.changes.borrow()[0].2, PROXY_STRATEGY);
    }

    #[test]
    fn interceptor_keeps_object_reads_current() {
        let obj = ObjectRef::from_pairs([("x", 0)]);
        let observer = SetterObserver::new(NONE, &obj, "x");
        observer.subscribe(Rc::new(Log::default()));
        observer.set_value(Value::from(9), NONE);
        assert_eq!(obj.get("x"), Value::from(9));
    }

    #[test]
    fn custom_setter_runs_original_setter() {
        let backing = Rc::new(RefCell::new(Value::from(1)));
        let get_backing = backing.clone();
        let set_backing = backing.clone();
        let obj = ObjectRef::new();
        let descriptor = Rc::new(
            AccessorProperty::getter(move |_| get_backing.borrow().clone())
                .with_setter(move |_, v| *set_backing.borrow_mut() = v),
        );
        obj.define_accessor("x", (*descriptor).clone());

        let observer = CustomSetterObserver::new(&obj, "x", descriptor);
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());

        obj.set("x", Value::from(2));
        obj.set("x", Value::from(2));
        assert_eq!(*backing.borrow(), Value::from(2));
        assert_eq!(obj.get("x"), Value::from(2));
        assert_eq!(log.changes.borrow().len(), 1);
    }
}
