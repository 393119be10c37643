// ============================================================================
// spark-observe - Observable Objects
// Property bags with data, accessor and intercepted properties
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap as OrderedMap;

use super::context::{track_property_read, untrack};
use super::types::{Interceptor, PropertyObserver};
use super::value::Value;
use crate::observation::cache::ObserverCache;

/// Getter of an accessor property. Receives the owning object.
pub type Getter = Rc<dyn Fn(&ObjectRef) -> Value>;

/// Setter of an accessor property. Receives the owning object.
pub type Setter = Rc<dyn Fn(&ObjectRef, Value)>;

/// Factory for an observer supplied by the getter itself.
pub type ObserverFactory = Rc<dyn Fn(&ObjectRef) -> Rc<dyn PropertyObserver>>;

// =============================================================================
// ACCESSOR PROPERTIES
// =============================================================================

/// Per-property overrides for computed observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputedOverrides {
    /// Dependencies never change: collect them once
    pub is_static: bool,
    /// Getter/setter pair whose dependencies must be tracked through the getter
    pub volatile: bool,
}

/// A getter/setter pair.
#[derive(Clone, Default)]
pub struct AccessorProperty {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    pub overrides: ComputedOverrides,
    pub observer_factory: Option<ObserverFactory>,
}

impl AccessorProperty {
    pub fn getter(get: impl Fn(&ObjectRef) -> Value + 'static) -> Self {
        Self { getter: Some(Rc::new(get)), ..Self::default() }
    }

    pub fn with_setter(mut self, set: impl Fn(&ObjectRef, Value) + 'static) -> Self {
        self.setter = Some(Rc::new(set));
        self
    }

    pub fn with_overrides(mut self, overrides: ComputedOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// The getter provides its own observer instead of a computed one.
    pub fn with_observer(
        mut self,
        factory: impl Fn(&ObjectRef) -> Rc<dyn PropertyObserver> + 'static,
    ) -> Self {
        self.observer_factory = Some(Rc::new(factory));
        self
    }
}

/// Property slot of an observable object.
#[derive(Clone)]
pub enum Property {
    Data(Value),
    Accessor(Rc<AccessorProperty>),
    /// Data property taken over by an observer
    Intercepted(Rc<dyn Interceptor>),
}

// =============================================================================
// OBJECT REF
// =============================================================================

pub struct ObjectInner {
    properties: RefCell<OrderedMap<Rc<str>, Property>>,
    observers: ObserverCache,
    synthetic: bool,
}

/// Shared handle to an observable property bag.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Rc<ObjectInner>,
}

impl ObjectRef {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Synthetic binding context created by the framework (override contexts).
    /// Properties are always observed through setter observers.
    pub fn binding_context() -> Self {
        Self::build(true)
    }

    fn build(synthetic: bool) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                properties: RefCell::new(OrderedMap::new()),
                observers: ObserverCache::default(),
                synthetic,
            }),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let obj = Self::new();
        {
            let mut props = obj.inner.properties.borrow_mut();
            for (key, value) in pairs {
                props.insert(Rc::from(key.as_ref()), Property::Data(value.into()));
            }
        }
        obj
    }

    pub fn is_synthetic(&self) -> bool {
        self.inner.synthetic
    }

    pub fn observers(&self) -> &ObserverCache {
        &self.inner.observers
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef { inner: Rc::downgrade(&self.inner) }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    fn slot(&self, key: &str) -> Option<Property> {
        self.inner.properties.borrow().get(key).cloned()
    }

    /// Read a property, reporting the read to the active collector.
    pub fn get(&self, key: &str) -> Value {
        track_property_read(|| Value::Object(self.clone()), key);
        self.get_untracked(key)
    }

    /// Read a property without reporting it.
    pub fn get_untracked(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Property::Data(value)) => value,
            Some(Property::Intercepted(interceptor)) => interceptor.get(),
            Some(Property::Accessor(accessor)) => match &accessor.getter {
                Some(getter) => untrack(|| getter(self)),
                None => Value::Undefined,
            },
        }
    }

    /// Write a property. Data writes create the property when missing.
    pub fn set(&self, key: &str, value: Value) {
        match self.slot(key) {
            Some(Property::Intercepted(interceptor)) => interceptor.set(value),
            Some(Property::Accessor(accessor)) => match &accessor.setter {
                Some(setter) => setter(self, value),
                None => tracing::trace!(key, "write to getter-only property ignored"),
            },
            Some(Property::Data(_)) | None => {
                self.inner
                    .properties
                    .borrow_mut()
                    .insert(Rc::from(key), Property::Data(value));
            }
        }
    }

    /// Own property test.
    pub fn has(&self, key: &str) -> bool {
        self.inner.properties.borrow().contains_key(key)
    }

    /// Property descriptor, if defined.
    pub fn property(&self, key: &str) -> Option<Property> {
        self.slot(key)
    }

    pub fn define_accessor(&self, key: &str, accessor: AccessorProperty) {
        self.inner
            .properties
            .borrow_mut()
            .insert(Rc::from(key), Property::Accessor(Rc::new(accessor)));
    }

    /// Replace a property with an observer's interceptor.
    pub(crate) fn intercept(&self, key: &str, interceptor: Rc<dyn Interceptor>) {
        self.inner
            .properties
            .borrow_mut()
            .insert(Rc::from(key), Property::Intercepted(interceptor));
    }

    /// Remove a property. Intercepted properties keep their observer cached,
    /// so deleting one is a plain removal of the slot.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.properties.borrow_mut().shift_remove(key).is_some()
    }

    /// Own property names in definition order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.properties.borrow().keys().cloned().collect()
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning handle to an observable object.
#[derive(Clone)]
pub struct WeakObjectRef {
    inner: Weak<ObjectInner>,
}

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.inner.upgrade().map(|inner| ObjectRef { inner })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn data_properties() {
        let obj = ObjectRef::from_pairs([("a", 1)]);
        assert_eq!(obj.get("a"), Value::from(1));
        assert_eq!(obj.get("missing"), Value::Undefined);
        obj.set("b", Value::from("x"));
        assert!(obj.has("b"));
        assert_eq!(obj.keys().len(), 2);
        assert!(obj.delete("a"));
        assert!(!obj.has("a"));
    }

    #[test]
    fn accessor_properties_receive_owner() {
        let obj = ObjectRef::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
        obj.define_accessor(
            "full",
            AccessorProperty::getter(|o| {
                Value::from(format!("{} {}", o.get("first"), o.get("last")))
            }),
        );
        assert_eq!(obj.get("full"), Value::from("Ada Lovelace"));
    }

    #[test]
    fn getter_only_write_is_ignored() {
        let obj = ObjectRef::new();
        obj.define_accessor("x", AccessorProperty::getter(|_| Value::from(1)));
        obj.set("x", Value::from(2));
        assert_eq!(obj.get("x"), Value::from(1));
    }

    #[test]
    fn setter_receives_writes() {
        let seen = Rc::new(Cell::new(0.0));
        let seen_clone = seen.clone();
        let obj = ObjectRef::new();
        obj.define_accessor(
            "x",
            AccessorProperty::getter(|_| Value::Undefined)
                .with_setter(move |_, v| seen_clone.set(v.to_number())),
        );
        obj.set("x", Value::from(4));
        assert_eq!(seen.get(), 4.0);
    }

    #[test]
    fn synthetic_flag() {
        assert!(ObjectRef::binding_context().is_synthetic());
        assert!(!ObjectRef::new().is_synthetic());
    }
}
