// ============================================================================
// spark-observe - Proxy Observer
// Interception wrapper observation for the proxy strategy
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use super::subscribers::SubscriberRegistry;
use crate::core::constants::UPDATE_TARGET_INSTANCE;
use crate::core::types::{Accessor, PropertyObserver, PropertySubscriber};
use crate::core::value::{Value, WeakTarget};

/// Interception wrapper around one object-like target.
///
/// Writes made through the wrapper notify the subscribers of the written key.
/// Writes made directly on the raw target bypass it. The wrapper owns one
/// [`ProxyPropertyObserver`] per key and lives in the target's observer cache,
/// not in its per-key table.
pub struct ProxyObserver {
    self_weak: Weak<ProxyObserver>,
    target: WeakTarget,
    observers: RefCell<FxHashMap<Rc<str>, Rc<ProxyPropertyObserver>>>,
}

impl ProxyObserver {
    /// Wrapper for `target`, created on first request and stored with the
    /// target's observers.
    pub fn get_or_create(target: &Value) -> Option<Rc<ProxyObserver>> {
        let cache = target.observer_cache()?;
        if let Some(proxy) = cache.proxy() {
            return Some(proxy);
        }
        let proxy = Rc::new_cyclic(|self_weak| ProxyObserver {
            self_weak: self_weak.clone(),
            target: target.downgrade(),
            observers: RefCell::new(FxHashMap::default()),
        });
        cache.set_proxy(proxy.clone());
        Some(proxy)
    }

    pub fn target(&self) -> Option<Value> {
        self.target.upgrade()
    }

    pub fn get(&self, key: &str) -> Value {
        self.target.upgrade().map(|t| t.get_property(key)).unwrap_or_default()
    }

    /// Write through the wrapper, notifying the key's subscribers on change.
    pub fn set(&self, key: &str, value: Value) {
        self.set_with_flags(key, value, UPDATE_TARGET_INSTANCE);
    }

    fn set_with_flags(&self, key: &str, value: Value, flags: u32) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let old = target.get_property(key);
        target.set_property(key, value.clone());
        if old == value {
            return;
        }
        let observer = self.observers.borrow().get(key).cloned();
        if let Some(observer) = observer {
            observer.subscribers.broadcast(|s| s.handle_change(&value, &old, flags));
        }
    }

    /// The observer for `key`; every call for the same key returns the same handle.
    pub fn property_observer(&self, key: &str) -> Rc<ProxyPropertyObserver> {
        if let Some(observer) = self.observers.borrow().get(key) {
            return observer.clone();
        }
        let key: Rc<str> = Rc::from(key);
        let observer = Rc::new(ProxyPropertyObserver {
            proxy: self.self_weak.clone(),
            key: key.clone(),
            subscribers: SubscriberRegistry::new(),
        });
        self.observers.borrow_mut().insert(key, observer.clone());
        observer
    }
}

/// One key of a [`ProxyObserver`].
pub struct ProxyPropertyObserver {
    proxy: Weak<ProxyObserver>,
    key: Rc<str>,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
}

impl Accessor for ProxyPropertyObserver {
    fn get_value(&self) -> Value {
        self.proxy.upgrade().map(|p| p.get(&self.key)).unwrap_or_default()
    }

    fn set_value(&self, value: Value, flags: u32) {
        if let Some(proxy) = self.proxy.upgrade() {
            proxy.set_with_flags(&self.key, value, flags | UPDATE_TARGET_INSTANCE);
        }
    }
}

impl PropertyObserver for ProxyPropertyObserver {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn PropertySubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    fn do_not_cache(&self) -> bool {
        true
    }

    fn as_accessor(self: Rc<Self>) -> Rc<dyn Accessor> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::ObjectRef;
    use std::cell::Cell;

    struct Hits(Cell<u32>);

    impl PropertySubscriber for Hits {
        fn handle_change(&self, _new: &Value, _old: &Value, _flags: u32) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn wrapper_is_shared_per_target() {
        let target = Value::from(ObjectRef::new());
        let a = ProxyObserver::get_or_create(&target).unwrap();
        let b = ProxyObserver::get_or_create(&target).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(ProxyObserver::get_or_create(&Value::from(1)).is_none());
    }

    #[test]
    fn one_handle_per_key() {
        let obj = ObjectRef::from_pairs([("x", 1)]);
        let proxy = ProxyObserver::get_or_create(&Value::from(obj.clone())).unwrap();
        let first = proxy.property_observer("x");
        let second = proxy.property_observer("x");
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &proxy.property_observer("y")));

        let hits = Rc::new(Hits(Cell::new(0)));
        let hits_dyn: Rc<dyn PropertySubscriber> = hits.clone();
        first.subscribe(hits_dyn.clone());
        assert!(second.has_subscribers());

        proxy.set("x", Value::from(2));
        assert_eq!(hits.0.get(), 1);
        assert_eq!(obj.get("x"), Value::from(2));

        // raw writes bypass the wrapper
        obj.set("x", Value::from(3));
        assert_eq!(hits.0.get(), 1);

        assert!(second.unsubscribe(&hits_dyn));
        proxy.set("x", Value::from(4));
        assert_eq!(hits.0.get(), 1);
    }
}
