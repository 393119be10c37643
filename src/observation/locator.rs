// ============================================================================
// spark-observe - Observer Locator
// Resolve the observation strategy for a (target, property) pair
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::computed_observer::ComputedObserver;
use super::dirty_checker::DirtyChecker;
use super::primitive_observer::PrimitiveObserver;
use super::property_accessor::{HostPropertyAccessor, PropertyAccessor};
use super::proxy_observer::ProxyObserver;
use super::setter_observer::{CustomSetterObserver, SetterObserver};
use crate::collections::array::ObservableArray;
use crate::collections::map::ObservableMap;
use crate::collections::observer::{CollectionKind, CollectionObserver};
use crate::collections::set::ObservableSet;
use crate::config::RuntimeConfig;
use crate::core::constants::PROXY_STRATEGY;
use crate::core::error::{Error, Result};
use crate::core::object::{AccessorProperty, ObjectRef, Property};
use crate::core::types::{Accessor, PropertyObserver};
use crate::core::value::Value;
use crate::lifecycle::Lifecycle;

// =============================================================================
// EXTENSION POINTS
// =============================================================================

/// Supplies observers for host targets (render nodes and the like).
pub trait TargetObserverLocator {
    /// Whether `target` belongs to this locator.
    fn handles(&self, target: &Value) -> bool;

    fn get_observer(
        &self,
        flags: u32,
        locator: &ObserverLocator,
        target: &Value,
        key: &str,
    ) -> Option<Rc<dyn PropertyObserver>>;

    /// Whether plain accessor requests for this property must also go
    /// through [`TargetObserverLocator::get_observer`].
    fn overrides_accessor(&self, flags: u32, target: &Value, key: &str) -> bool;
}

/// Fallback observer provider consulted before dirty checking.
pub trait ObjectAdapter {
    fn get_observer(
        &self,
        flags: u32,
        target: &Value,
        key: &str,
        descriptor: Option<&AccessorProperty>,
    ) -> Option<Rc<dyn PropertyObserver>>;
}

// =============================================================================
// OBSERVER LOCATOR
// =============================================================================

/// Single entry point for obtaining observers and accessors.
///
/// Lookup order for [`ObserverLocator::get_observer`]:
/// 1. proxy strategy flag on an object-like target: the wrapper's handle
/// 2. observer already cached on the target
/// 3. classification of the target and property, caching the result
pub struct ObserverLocator {
    lifecycle: Rc<Lifecycle>,
    dirty_checker: Rc<DirtyChecker>,
    target_observer_locator: RefCell<Option<Rc<dyn TargetObserverLocator>>>,
    adapters: RefCell<Vec<Rc<dyn ObjectAdapter>>>,
    self_weak: Weak<ObserverLocator>,
}

impl ObserverLocator {
    pub fn new(lifecycle: Rc<Lifecycle>, config: &RuntimeConfig) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            lifecycle,
            dirty_checker: DirtyChecker::new(config.dirty_check),
            target_observer_locator: RefCell::new(None),
            adapters: RefCell::new(Vec::new()),
            self_weak: self_weak.clone(),
        })
    }

    pub fn lifecycle(&self) -> &Rc<Lifecycle> {
        &self.lifecycle
    }

    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.dirty_checker
    }

    pub fn set_target_observer_locator(&self, locator: Rc<dyn TargetObserverLocator>) {
        *self.target_observer_locator.borrow_mut() = Some(locator);
    }

    pub fn add_adapter(&self, adapter: Rc<dyn ObjectAdapter>) {
        self.adapters.borrow_mut().push(adapter);
    }

    fn target_locator_for(&self, target: &Value) -> Option<Rc<dyn TargetObserverLocator>> {
        let locator = self.target_observer_locator.borrow().clone()?;
        locator.handles(target).then_some(locator)
    }

    // =========================================================================
    // PROPERTY OBSERVERS
    // =========================================================================

    /// Observer for `key` on `target`.
    ///
    /// Repeated calls with the same target and key return the same instance,
    /// except for primitive targets and the proxy strategy.
    pub fn get_observer(
        &self,
        flags: u32,
        target: &Value,
        key: &str,
    ) -> Result<Rc<dyn PropertyObserver>> {
        if flags & PROXY_STRATEGY != 0 {
            if let Some(proxy) = ProxyObserver::get_or_create(target) {
                return Ok(proxy.property_observer(key));
            }
        }

        let Some(cache) = target.observer_cache() else {
            return Ok(PrimitiveObserver::new(target.clone(), key));
        };
        if let Some(observer) = cache.get(key) {
            return Ok(observer);
        }

        let observer = self.create_property_observer(flags, target, key)?;
        if observer.do_not_cache() {
            return Ok(observer);
        }
        Ok(cache.insert(key, observer))
    }

    fn create_property_observer(
        &self,
        flags: u32,
        target: &Value,
        key: &str,
    ) -> Result<Rc<dyn PropertyObserver>> {
        if let Some(targets) = self.target_locator_for(target) {
            if let Some(observer) = targets.get_observer(flags, self, target, key) {
                return Ok(observer);
            }
            return self.adapter_or_dirty_check(flags, target, key, None);
        }

        match target {
            Value::Object(object) => {
                if object.is_synthetic() {
                    return Ok(SetterObserver::new(flags, object, key));
                }
                match object.property(key) {
                    Some(Property::Accessor(descriptor)) => {
                        if let Some(factory) = &descriptor.observer_factory {
                            return Ok(factory(object));
                        }
                        if let Some(observer) = self.adapter_observer(flags, target, key, Some(descriptor.as_ref())) {
                            return Ok(observer);
                        }
                        self.create_computed_observer(object, key, descriptor)
                    }
                    _ => Ok(SetterObserver::new(flags, object, key)),
                }
            }
            Value::Array(array) if key == "length" => {
                Ok(self.get_array_observer(array).length_observer())
            }
            Value::Map(map) if key == "size" => Ok(self.get_map_observer(map).length_observer()),
            Value::Set(set) if key == "size" => Ok(self.get_set_observer(set).length_observer()),
            Value::Host(_) => self.adapter_or_dirty_check(flags, target, key, None),
            Value::Array(_) | Value::Map(_) | Value::Set(_) => {
                Ok(self.dirty_checker.create_property(target, key)?)
            }
            primitive => Ok(PrimitiveObserver::new(primitive.clone(), key)),
        }
    }

    fn adapter_observer(
        &self,
        flags: u32,
        target: &Value,
        key: &str,
        descriptor: Option<&AccessorProperty>,
    ) -> Option<Rc<dyn PropertyObserver>> {
        let adapters = self.adapters.borrow().clone();
        adapters
            .iter()
            .find_map(|adapter| adapter.get_observer(flags, target, key, descriptor))
    }

    fn adapter_or_dirty_check(
        &self,
        flags: u32,
        target: &Value,
        key: &str,
        descriptor: Option<&AccessorProperty>,
    ) -> Result<Rc<dyn PropertyObserver>> {
        match self.adapter_observer(flags, target, key, descriptor) {
            Some(observer) => Ok(observer),
            None => Ok(self.dirty_checker.create_property(target, key)?),
        }
    }

    fn create_computed_observer(
        &self,
        object: &ObjectRef,
        key: &str,
        descriptor: Rc<AccessorProperty>,
    ) -> Result<Rc<dyn PropertyObserver>> {
        match (&descriptor.getter, &descriptor.setter) {
            (Some(_), Some(_)) if !descriptor.overrides.volatile => {
                Ok(CustomSetterObserver::new(object, key, descriptor))
            }
            (Some(_), _) => Ok(ComputedObserver::new(object, key, descriptor, self.self_weak.clone())),
            (None, _) => Err(Error::SetterOnlyProperty(key.to_string())),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Non-observing accessor for `key` on `target`, used for binding targets.
    pub fn get_accessor(&self, flags: u32, target: &Value, key: &str) -> Rc<dyn Accessor> {
        if let Some(targets) = self.target_locator_for(target) {
            if targets.overrides_accessor(flags, target, key) {
                if let Some(observer) = targets.get_observer(flags, self, target, key) {
                    return observer.as_accessor();
                }
            }
        }
        if flags & PROXY_STRATEGY != 0 {
            if let Some(proxy) = ProxyObserver::get_or_create(target) {
                return proxy.property_observer(key);
            }
        }
        match target {
            Value::Host(host) => HostPropertyAccessor::new(host.clone(), key),
            value if value.is_object_like() => PropertyAccessor::new(value.clone(), key),
            primitive => PrimitiveObserver::new(primitive.clone(), key),
        }
    }

    // =========================================================================
    // COLLECTION OBSERVERS
    // =========================================================================

    pub fn get_array_observer(&self, array: &ObservableArray) -> Rc<CollectionObserver> {
        if let Some(observer) = array.observer() {
            return observer;
        }
        let observer =
            CollectionObserver::new(CollectionKind::Array, &Value::from(array.clone()), self.lifecycle.clone());
        array.set_observer(observer.clone());
        observer
    }

    pub fn get_map_observer(&self, map: &ObservableMap) -> Rc<CollectionObserver> {
        if let Some(observer) = map.observer() {
            return observer;
        }
        let observer =
            CollectionObserver::new(CollectionKind::Map, &Value::from(map.clone()), self.lifecycle.clone());
        map.set_observer(observer.clone());
        observer
    }

    pub fn get_set_observer(&self, set: &ObservableSet) -> Rc<CollectionObserver> {
        if let Some(observer) = set.observer() {
            return observer;
        }
        let observer =
            CollectionObserver::new(CollectionKind::Set, &Value::from(set.clone()), self.lifecycle.clone());
        set.set_observer(observer.clone());
        observer
    }

    /// Collection observer for any collection value.
    pub fn collection_observer(&self, target: &Value) -> Option<Rc<CollectionObserver>> {
        match target {
            Value::Array(array) => Some(self.get_array_observer(array)),
            Value::Map(map) => Some(self.get_map_observer(map)),
            Value::Set(set) => Some(self.get_set_observer(set)),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
