// ============================================================================
// spark-observe - Type Definitions
// Type-erased traits for observers, subscribers and host objects
// ============================================================================

use std::any::Any;
use std::rc::Rc;

use super::value::Value;
use crate::collections::index_map::IndexMap;
use crate::observation::cache::ObserverCache;

// =============================================================================
// SUBSCRIBERS
// =============================================================================
//
// Subscribers are stored as `Rc<dyn ...>` in subscriber registries and are
// compared by pointer identity. A subscriber may be registered with many
// observers at once, and one observer may hold any number of subscribers.
// =============================================================================

/// Receives property change notifications.
pub trait PropertySubscriber: Any {
    fn handle_change(&self, new_value: &Value, old_value: &Value, flags: u32);
}

/// Structural mutation that produced an immediate collection notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Reverse,
    Sort,
    /// Indexed write on an array
    Assign,
    /// Length write on an array
    Truncate,
    /// Map insert or replace
    Set,
    Delete,
    Clear,
    /// Set insert
    Add,
}

/// Receives one immediate notification per collection mutation.
pub trait CollectionSubscriber: Any {
    fn handle_collection_change(&self, kind: MutationKind, flags: u32);
}

/// Receives one batched notification per flush, carrying the accumulated
/// index map.
pub trait BatchedCollectionSubscriber: Any {
    fn handle_batched_change(&self, index_map: &IndexMap, flags: u32);
}

// =============================================================================
// ACCESSORS AND OBSERVERS
// =============================================================================

/// Reads and writes one property of one target.
pub trait Accessor: Any {
    fn get_value(&self) -> Value;
    fn set_value(&self, value: Value, flags: u32);
}

/// An accessor that also notifies subscribers when the property changes.
pub trait PropertyObserver: Accessor {
    /// Returns false when the subscriber was already registered.
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool;

    /// Returns false when the subscriber was not registered.
    fn unsubscribe(&self, subscriber: &Rc<dyn PropertySubscriber>) -> bool;

    fn has_subscribers(&self) -> bool;

    /// Observers that must not be stored in the target's observer cache.
    fn do_not_cache(&self) -> bool {
        false
    }

    /// View this observer as a plain accessor.
    fn as_accessor(self: Rc<Self>) -> Rc<dyn Accessor>;

    fn as_any(&self) -> &dyn Any;
}

/// Replacement accessor installed on an object property by an observer.
///
/// Reads and writes of an intercepted property go through the interceptor
/// so the owning observer sees every write.
pub trait Interceptor {
    fn get(&self) -> Value;
    fn set(&self, value: Value);
}

// =============================================================================
// HOST OBJECTS
// =============================================================================

/// An object owned by the embedding host (render target, platform object).
///
/// Host objects are never instrumented. They are observed through a pluggable
/// target-observer locator, an object adapter, or dirty checking.
pub trait HostObject: Any {
    fn get_property(&self, key: &str) -> Value;

    fn set_property(&self, key: &str, value: Value);

    /// Observer cache for this host object.
    fn observers(&self) -> &ObserverCache;

    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// DEPENDENCY COLLECTION
// =============================================================================

/// Records the reads performed while a computed getter runs.
pub trait DependencyCollector {
    fn collect_property(&self, target: &Value, key: &str);
    fn collect_collection(&self, target: &Value);
}

/// Pointer identity of any `Rc`, ignoring trait-object metadata.
pub(crate) fn rc_addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Identity comparison for two `Rc` handles that may have different
/// trait-object types.
pub(crate) fn same_rc<A: ?Sized, B: ?Sized>(a: &Rc<A>, b: &Rc<B>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}
