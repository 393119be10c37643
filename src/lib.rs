// ============================================================================
// spark-observe - Reactive Observation and Lifecycle Coordination
// ============================================================================
//
// Property and collection observers, a batched lifecycle coordinator with
// completion tasks, expression bindings that connect to what they read, and a
// composition coordinator that swaps views one at a time.
//
// Everything is single-threaded: shared state lives in `Rc` + `RefCell`, and
// the per-thread observation context sits in a thread-local.
// ============================================================================

pub mod binding;
pub mod collections;
pub mod config;
pub mod core;
pub mod lifecycle;
pub mod observation;
pub mod templating;

// Value model and contracts at the crate root
pub use core::constants;
pub use core::context::{
    disable_array_observation, disable_map_observation, disable_set_observation,
    enable_array_observation, enable_map_observation, enable_set_observation, is_collecting,
    untrack, with_context, ObservationContext,
};
pub use core::error::{Error, Result};
pub use core::object::{AccessorProperty, ComputedOverrides, ObjectRef};
pub use core::types::{
    Accessor, BatchedCollectionSubscriber, CollectionSubscriber, HostObject, MutationKind,
    PropertyObserver, PropertySubscriber,
};
pub use core::value::{HostRef, Value};

pub use config::{DirtyCheckSettings, RuntimeConfig, ViewCacheSize};

pub use collections::{CollectionObserver, IndexMap, ObservableArray, ObservableMap, ObservableSet, NEW_ITEM};
pub use observation::{DirtyChecker, ObserverLocator, SubscriberRegistry};

pub use lifecycle::{
    done_task, AggregateTask, Deferred, Flushable, Lifecycle, LifecycleNode, LifecycleTask,
    PromiseTask, Queue,
};

pub use binding::{
    Bindable, BindableExpression, BindingMode, Connectable, Expression, PropertyBinding,
    ResourceLocator, Resources, Scope,
};

pub use templating::{Composable, CompositionCoordinator, NodeSequence, View, ViewFactory, ViewParts, ViewTemplate};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn flags_are_distinct_bits() {
        let states = [
            constants::IS_BINDING,
            constants::IS_BOUND,
            constants::IS_ATTACHING,
            constants::IS_ATTACHED,
            constants::IS_DETACHING,
            constants::IS_UNBINDING,
            constants::IS_CACHED,
            constants::IS_MOUNTED,
        ];
        for (i, a) in states.iter().enumerate() {
            assert_eq!(a.count_ones(), 1);
            for b in &states[i + 1..] {
                assert_eq!(a & b, 0);
            }
        }
    }

    #[test]
    fn root_exports_work_together() {
        let lifecycle = Lifecycle::new();
        let locator = ObserverLocator::new(lifecycle.clone(), &RuntimeConfig::default());
        let object = ObjectRef::from_pairs([("count", 1)]);
        let observer = locator.get_observer(constants::NONE, &Value::from(object.clone()), "count").unwrap();
        assert_eq!(observer.get_value(), Value::from(1));

        let task: Rc<dyn LifecycleTask> = done_task();
        assert!(task.is_done());
    }
}
