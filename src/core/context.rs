// ============================================================================
// spark-observe - Observation Context
// Thread-local state for instrumentation toggles and dependency collection
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::types::DependencyCollector;
use super::value::Value;

// =============================================================================
// OBSERVATION CONTEXT
// =============================================================================

/// Thread-local observation context holding all global state.
pub struct ObservationContext {
    // =========================================================================
    // INSTRUMENTATION
    // =========================================================================
    /// Array mutators notify their observer
    pub array_observation: Cell<bool>,

    /// Map mutators notify their observer
    pub map_observation: Cell<bool>,

    /// Set mutators notify their observer
    pub set_observation: Cell<bool>,

    // =========================================================================
    // DEPENDENCY COLLECTION
    // =========================================================================
    /// Collector receiving reads made by the running computed getter
    pub collector: RefCell<Option<Rc<dyn DependencyCollector>>>,

    /// Reads are not reported while untracking
    pub untracking: Cell<bool>,
}

impl ObservationContext {
    pub fn new() -> Self {
        Self {
            array_observation: Cell::new(true),
            map_observation: Cell::new(true),
            set_observation: Cell::new(true),
            collector: RefCell::new(None),
            untracking: Cell::new(false),
        }
    }

    /// Install a collector, returning the previous one
    pub fn set_collector(
        &self,
        collector: Option<Rc<dyn DependencyCollector>>,
    ) -> Option<Rc<dyn DependencyCollector>> {
        self.collector.replace(collector)
    }

    /// Active collector, unless reads are untracked
    pub fn active_collector(&self) -> Option<Rc<dyn DependencyCollector>> {
        if self.untracking.get() {
            return None;
        }
        self.collector.borrow().clone()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_collecting(&self) -> bool {
        !self.untracking.get() && self.collector.borrow().is_some()
    }
}

impl Default for ObservationContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: ObservationContext = ObservationContext::new();
}

/// Access the thread-local observation context.
pub fn with_context<R>(f: impl FnOnce(&ObservationContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// INSTRUMENTATION TOGGLES
// =============================================================================
//
// Collections always carry their observer once one is created. The toggles
// decide whether mutators report to it. Disabling leaves the observer (and its
// index map) untouched, so it keeps whatever it accumulated so far.
// =============================================================================

pub fn enable_array_observation() {
    with_context(|ctx| ctx.array_observation.set(true));
}

pub fn disable_array_observation() {
    with_context(|ctx| ctx.array_observation.set(false));
}

pub fn is_array_observation_enabled() -> bool {
    with_context(|ctx| ctx.array_observation.get())
}

pub fn enable_map_observation() {
    with_context(|ctx| ctx.map_observation.set(true));
}

pub fn disable_map_observation() {
    with_context(|ctx| ctx.map_observation.set(false));
}

pub fn is_map_observation_enabled() -> bool {
    with_context(|ctx| ctx.map_observation.get())
}

pub fn enable_set_observation() {
    with_context(|ctx| ctx.set_observation.set(true));
}

pub fn disable_set_observation() {
    with_context(|ctx| ctx.set_observation.set(false));
}

pub fn is_set_observation_enabled() -> bool {
    with_context(|ctx| ctx.set_observation.get())
}

// =============================================================================
// DEPENDENCY COLLECTION
// =============================================================================

/// Run `f` with `collector` receiving every observable read it performs.
///
/// Nested calls stack: the previous collector is restored afterwards, even on
/// panic.
pub fn collect_dependencies<R>(
    collector: Rc<dyn DependencyCollector>,
    f: impl FnOnce() -> R,
) -> R {
    struct CollectGuard {
        prev_collector: Option<Rc<dyn DependencyCollector>>,
        prev_untracking: bool,
    }

    impl Drop for CollectGuard {
        fn drop(&mut self) {
            let prev = self.prev_collector.take();
            let untracking = self.prev_untracking;
            with_context(|ctx| {
                ctx.set_collector(prev);
                ctx.set_untracking(untracking);
            });
        }
    }

    let (prev_collector, prev_untracking) = with_context(|ctx| {
        (ctx.set_collector(Some(collector)), ctx.set_untracking(false))
    });
    let _guard = CollectGuard { prev_collector, prev_untracking };
    f()
}

/// Run `f` without reporting reads to the active collector.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            let prev = self.prev;
            with_context(|ctx| ctx.set_untracking(prev));
        }
    }

    let prev = with_context(|ctx| ctx.set_untracking(true));
    let _guard = UntrackGuard { prev };
    f()
}

/// Whether a read right now would be reported.
pub fn is_collecting() -> bool {
    with_context(|ctx| ctx.is_collecting())
}

/// Report a property read to the active collector.
pub(crate) fn track_property_read(target: impl FnOnce() -> Value, key: &str) {
    if let Some(collector) = with_context(|ctx| ctx.active_collector()) {
        collector.collect_property(&target(), key);
    }
}

/// Report a collection read to the active collector.
pub(crate) fn track_collection_read(target: impl FnOnce() -> Value) {
    if let Some(collector) = with_context(|ctx| ctx.active_collector()) {
        collector.collect_collection(&target());
    }
}

// =============================================================================
// TESTS
// =============================================================================
