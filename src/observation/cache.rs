// ============================================================================
// spark-observe - Observer Cache
// Per-target storage of property observers
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::proxy_observer::ProxyObserver;
use crate::core::types::PropertyObserver;

/// Observers attached to one target, keyed by property name.
///
/// Once an observer is cached for a key, every later lookup of that key on
/// the same target returns the same instance.
#[derive(Default)]
pub struct ObserverCache {
    observers: RefCell<FxHashMap<Rc<str>, Rc<dyn PropertyObserver>>>,
    proxy: RefCell<Option<Rc<ProxyObserver>>>,
}

impl ObserverCache {
    pub fn get(&self, key: &str) -> Option<Rc<dyn PropertyObserver>> {
        self.observers.borrow().get(key).cloned()
    }

    /// Cache an observer. An observer already cached for the key wins.
    pub fn insert(&self, key: &str, observer: Rc<dyn PropertyObserver>) -> Rc<dyn PropertyObserver> {
        self.observers
            .borrow_mut()
            .entry(Rc::from(key))
            .or_insert(observer)
            .clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.observers.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    pub(crate) fn proxy(&self) -> Option<Rc<ProxyObserver>> {
        self.proxy.borrow().clone()
    }

    pub(crate) fn set_proxy(&self, proxy: Rc<ProxyObserver>) {
        *self.proxy.borrow_mut() = Some(proxy);
    }
}
