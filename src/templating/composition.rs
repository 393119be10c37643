// ============================================================================
// spark-observe - Composition Coordinator
// Swaps the single view shown at a composition point
// ============================================================================
//
// Only one swap runs at a time. Requests that arrive mid-swap wait in a
// one-slot queue where the newest request wins, and the running swap is
// cancelled if it still can be.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::view::View;
use crate::binding::property_binding::Bindable;
use crate::binding::scope::Scope;
use crate::core::error::{Error, Result};
use crate::lifecycle::{done_task, AggregateTask, Deferred, Lifecycle, LifecycleTask, PromiseTask};

/// Something that can be shown at a composition point.
#[derive(Clone)]
pub enum Composable {
    View(Rc<View>),
    /// A view that is still being produced. Settling with `None` clears.
    Pending(Deferred<Option<Rc<View>>>),
    /// Show nothing.
    Clear,
}

impl From<Rc<View>> for Composable {
    fn from(view: Rc<View>) -> Self {
        Composable::View(view)
    }
}

impl From<Option<Rc<View>>> for Composable {
    fn from(view: Option<Rc<View>>) -> Self {
        view.map_or(Composable::Clear, Composable::View)
    }
}

/// Owns the current view of a composition point and sequences swaps.
pub struct CompositionCoordinator {
    self_weak: Weak<CompositionCoordinator>,
    lifecycle: Rc<Lifecycle>,
    current_view: RefCell<Option<Rc<View>>>,
    queue: RefCell<Option<Composable>>,
    swap_task: RefCell<Rc<dyn LifecycleTask>>,
    scope: RefCell<Option<Rc<Scope>>>,
    is_bound: Cell<bool>,
    is_attached: Cell<bool>,
    on_swap_complete: RefCell<Option<Rc<dyn Fn()>>>,
    error: RefCell<Option<Error>>,
}

impl CompositionCoordinator {
    pub fn new(lifecycle: Rc<Lifecycle>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            lifecycle,
            current_view: RefCell::new(None),
            queue: RefCell::new(None),
            swap_task: RefCell::new(done_task()),
            scope: RefCell::new(None),
            is_bound: Cell::new(false),
            is_attached: Cell::new(false),
            on_swap_complete: RefCell::new(None),
            error: RefCell::new(None),
        })
    }

    pub fn current_view(&self) -> Option<Rc<View>> {
        self.current_view.borrow().clone()
    }

    pub fn is_swapping(&self) -> bool {
        !self.swap_task.borrow().is_done()
    }

    pub fn is_bound(&self) -> bool {
        self.is_bound.get()
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached.get()
    }

    /// Called after every finished swap.
    pub fn set_on_swap_complete(&self, callback: impl Fn() + 'static) {
        *self.on_swap_complete.borrow_mut() = Some(Rc::new(callback));
    }

    /// Last error raised while binding a swapped-in view.
    pub fn take_error(&self) -> Option<Error> {
        self.error.borrow_mut().take()
    }

    // =========================================================================
    // COMPOSE
    // =========================================================================

    /// Show `value`. While a swap is running the request is queued, replacing
    /// any earlier queued one.
    pub fn compose(&self, value: impl Into<Composable>, flags: u32) {
        let value = value.into();
        let current_task = self.swap_task.borrow().clone();
        if current_task.is_done() {
            self.dispatch(value, flags);
            return;
        }
        *self.queue.borrow_mut() = Some(value);
        if current_task.can_cancel() {
            tracing::debug!("cancelling running swap");
            current_task.cancel();
        }
    }

    fn dispatch(&self, value: Composable, flags: u32) {
        match value {
            Composable::View(view) => self.swap(Some(view), flags),
            Composable::Pending(deferred) => self.start_promise_swap(&deferred, flags),
            Composable::Clear => self.swap(None, flags),
        }
    }

    fn process_next(&self, flags: u32) {
        let next = self.queue.borrow_mut().take();
        if let Some(next) = next {
            self.dispatch(next, flags);
        }
    }

    fn start_promise_swap(&self, deferred: &Deferred<Option<Rc<View>>>, flags: u32) {
        let weak = self.self_weak.clone();
        let task = PromiseTask::new(deferred, move |view: Option<Rc<View>>| {
            if let Some(this) = weak.upgrade() {
                this.swap(view, flags);
            }
            None
        });
        if task.is_done() {
            return;
        }

        *self.swap_task.borrow_mut() = task.clone();
        let weak = self.self_weak.clone();
        let promise = Rc::downgrade(&task);
        task.on_done(Box::new(move || {
            let cancelled = promise.upgrade().is_some_and(|task| task.is_cancelled());
            if !cancelled {
                return;
            }
            if let Some(this) = weak.upgrade() {
                this.process_next(flags);
            }
        }));
    }

    // =========================================================================
    // SWAP
    // =========================================================================

    fn swap(&self, view: Option<Rc<View>>, flags: u32) {
        let current = self.current_view();
        let same = match (&current, &view) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }

        let swap_task = AggregateTask::new();

        if let Some(old) = current {
            old.release(flags);
            if self.is_attached.get() {
                self.lifecycle.enqueue_unbind_after_detach(old.clone());
                self.lifecycle.begin_detach();
                old.detach(flags);
                swap_task.add_task(self.lifecycle.end_detach(flags));
            } else if self.is_bound.get() {
                self.lifecycle.begin_unbind();
                old.unbind(flags);
                swap_task.add_task(self.lifecycle.end_unbind(flags));
            }
        }

        *self.current_view.borrow_mut() = view.clone();

        if let Some(view) = view {
            let mut bind_task = done_task();
            if self.is_bound.get() {
                if let Some(scope) = self.scope.borrow().clone() {
                    self.lifecycle.begin_bind();
                    if let Err(error) = view.bind(flags, &scope) {
                        tracing::error!(%error, "failed to bind composed view");
                        *self.error.borrow_mut() = Some(error);
                    }
                    bind_task = self.lifecycle.end_bind(flags);
                    swap_task.add_task(bind_task.clone());
                }
            }
            if self.is_attached.get() {
                if bind_task.is_done() {
                    self.lifecycle.begin_attach();
                    view.attach(flags);
                    swap_task.add_task(self.lifecycle.end_attach(flags));
                } else {
                    // Attach once the async bind work settles
                    let weak = self.self_weak.clone();
                    bind_task.on_done(Box::new(move || {
                        if let Some(this) = weak.upgrade() {
                            this.attach_if_current(&view, flags);
                        }
                    }));
                }
            }
        }

        tracing::debug!(pending = !swap_task.is_done(), "view swapped");

        if swap_task.is_done() {
            *self.swap_task.borrow_mut() = done_task();
            self.swap_complete(flags);
        } else {
            *self.swap_task.borrow_mut() = swap_task.clone();
            let weak = self.self_weak.clone();
            swap_task.on_done(Box::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.swap_complete(flags);
                }
            }));
        }
    }

    fn attach_if_current(&self, view: &Rc<View>, flags: u32) {
        let is_current = self
            .current_view
            .borrow()
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, view));
        if is_current && self.is_attached.get() {
            view.attach(flags);
        }
    }

    fn swap_complete(&self, flags: u32) {
        let callback = self.on_swap_complete.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
        self.process_next(flags);
    }

    // =========================================================================
    // OWNER LIFECYCLE
    // =========================================================================

    /// The owner is binding: bind the current view to `scope`.
    pub fn binding(&self, flags: u32, scope: &Rc<Scope>) -> Result<()> {
        *self.scope.borrow_mut() = Some(scope.clone());
        self.is_bound.set(true);
        match self.current_view() {
            Some(view) => view.bind(flags, scope),
            None => Ok(()),
        }
    }

    pub fn attaching(&self, flags: u32) {
        self.is_attached.set(true);
        if let Some(view) = self.current_view() {
            view.attach(flags);
        }
    }

    pub fn detaching(&self, flags: u32) {
        self.is_attached.set(false);
        if let Some(view) = self.current_view() {
            view.detach(flags);
        }
    }

    pub fn unbinding(&self, flags: u32) {
        self.is_bound.set(false);
        if let Some(view) = self.current_view() {
            view.unbind(flags);
        }
        *self.scope.borrow_mut() = None;
    }

    pub fn caching(&self, flags: u32) {
        if let Some(view) = self.current_view() {
            view.cache(flags);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::NONE;
    use crate::core::value::Value;
    use crate::templating::view::{NodeSequence, ViewParts};

    #[derive(Default)]
    struct Nodes {
        mounted: Cell<bool>,
    }

    impl NodeSequence for Nodes {
        fn mount(&self) {
            self.mounted.set(true);
        }
        fn unmount(&self) {
            self.mounted.set(false);
        }
    }

    fn view(lifecycle: &Rc<Lifecycle>) -> (Rc<View>, Rc<Nodes>) {
        let nodes = Rc::new(Nodes::default());
        let view = View::new(
            lifecycle.clone(),
            ViewParts {
                nodes: nodes.clone(),
                bindings: Vec::new(),
            },
        );
        (view, nodes)
    }

    fn live_coordinator(lifecycle: &Rc<Lifecycle>) -> Rc<CompositionCoordinator> {
        let coordinator = CompositionCoordinator::new(lifecycle.clone());
        coordinator.binding(NONE, &Scope::create(Value::Null, None)).unwrap();
        coordinator.attaching(NONE);
        coordinator
    }

    #[test]
    fn swap_replaces_the_current_view() {
        let lifecycle = Lifecycle::new();
        let coordinator = live_coordinator(&lifecycle);
        let swaps = Rc::new(Cell::new(0));
        let counter = swaps.clone();
        coordinator.set_on_swap_complete(move || counter.set(counter.get() + 1));

        let (a, a_nodes) = view(&lifecycle);
        let (b, b_nodes) = view(&lifecycle);
        coordinator.compose(a.clone(), NONE);
        assert!(a.is_bound() && a.is_attached());
        assert!(a_nodes.mounted.get());

        coordinator.compose(b.clone(), NONE);
        assert!(!a.is_bound() && !a.is_attached());
        assert!(!a_nodes.mounted.get());
        assert!(b_nodes.mounted.get());
        assert_eq!(swaps.get(), 2);

        // same view again is a no-op
        coordinator.compose(b.clone(), NONE);
        assert_eq!(swaps.get(), 2);

        coordinator.compose(Composable::Clear, NONE);
        assert!(coordinator.current_view().is_none());
        assert!(!b_nodes.mounted.get());
    }

    #[test]
    fn pending_view_swaps_on_settlement() {
        let lifecycle = Lifecycle::new();
        let coordinator = live_coordinator(&lifecycle);
        let (a, _) = view(&lifecycle);
        let deferred = Deferred::new();

        coordinator.compose(Composable::Pending(deferred.clone()), NONE);
        assert!(coordinator.is_swapping());
        assert!(coordinator.current_view().is_none());

        deferred.resolve(Some(a.clone()));
        assert!(!coordinator.is_swapping());
        assert!(coordinator.current_view().is_some_and(|v| Rc::ptr_eq(&v, &a)));
    }

    #[test]
    fn newer_request_cancels_pending_one() {
        let lifecycle = Lifecycle::new();
        let coordinator = live_coordinator(&lifecycle);
        let (a, _) = view(&lifecycle);
        let (b, _) = view(&lifecycle);
        let deferred = Deferred::new();

        coordinator.compose(Composable::Pending(deferred.clone()), NONE);
        coordinator.compose(b.clone(), NONE);
        assert!(coordinator.current_view().is_none());

        deferred.resolve(Some(a.clone()));
        assert!(!a.is_bound());
        assert!(coordinator.current_view().is_some_and(|v| Rc::ptr_eq(&v, &b)));
    }

    #[test]
    fn owner_lifecycle_reaches_current_view() {
        let lifecycle = Lifecycle::new();
        let coordinator = CompositionCoordinator::new(lifecycle.clone());
        let (a, _) = view(&lifecycle);
        coordinator.compose(a.clone(), NONE);
        assert!(!a.is_bound());

        coordinator.binding(NONE, &Scope::create(Value::Null, None)).unwrap();
        coordinator.attaching(NONE);
        assert!(a.is_bound() && a.is_attached());

        coordinator.detaching(NONE);
        coordinator.unbinding(NONE);
        assert!(!a.is_bound() && !a.is_attached());
        assert!(coordinator.take_error().is_none());
    }
}
