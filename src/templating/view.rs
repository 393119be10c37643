// ============================================================================
// spark-observe - View
// A rendered unit: host nodes plus the bindings that feed them
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::factory::ViewFactory;
use crate::binding::property_binding::Bindable;
use crate::binding::scope::Scope;
use crate::core::constants::*;
use crate::core::error::Result;
use crate::lifecycle::{Lifecycle, LifecycleNode};

/// Host-side node range owned by a view (external projector).
pub trait NodeSequence {
    /// Insert the nodes into the host.
    fn mount(&self);

    /// Remove the nodes from the host.
    fn unmount(&self);
}

/// Nodes and bindings produced by rendering a template once.
pub struct ViewParts {
    pub nodes: Rc<dyn NodeSequence>,
    pub bindings: Vec<Rc<dyn Bindable>>,
}

/// A bindable, attachable unit of rendered content.
///
/// Mount and unmount go through the lifecycle queues, so nested attach and
/// detach calls touch the host once per batch.
pub struct View {
    self_weak: Weak<View>,
    lifecycle: Rc<Lifecycle>,
    factory: Option<Weak<ViewFactory>>,
    nodes: Rc<dyn NodeSequence>,
    bindings: Vec<Rc<dyn Bindable>>,
    scope: RefCell<Option<Rc<Scope>>>,
    state: Cell<u32>,
    is_free: Cell<bool>,
}

impl View {
    pub fn new(lifecycle: Rc<Lifecycle>, parts: ViewParts) -> Rc<Self> {
        Self::build(lifecycle, None, parts)
    }

    pub(crate) fn build(
        lifecycle: Rc<Lifecycle>,
        factory: Option<Weak<ViewFactory>>,
        parts: ViewParts,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            lifecycle,
            factory,
            nodes: parts.nodes,
            bindings: parts.bindings,
            scope: RefCell::new(None),
            state: Cell::new(0),
            is_free: Cell::new(false),
        })
    }

    pub fn state(&self) -> u32 {
        self.state.get()
    }

    fn has(&self, bit: u32) -> bool {
        self.state.get() & bit != 0
    }

    fn set(&self, bit: u32) {
        self.state.set(self.state.get() | bit);
    }

    fn clear(&self, bit: u32) {
        self.state.set(self.state.get() & !bit);
    }

    pub fn is_attached(&self) -> bool {
        self.has(IS_ATTACHED)
    }

    pub fn is_mounted(&self) -> bool {
        self.has(IS_MOUNTED)
    }

    pub fn is_cached(&self) -> bool {
        self.has(IS_CACHED)
    }

    pub fn scope(&self) -> Option<Rc<Scope>> {
        self.scope.borrow().clone()
    }

    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.factory.as_ref().and_then(Weak::upgrade)
    }

    fn this(&self) -> Option<Rc<View>> {
        self.self_weak.upgrade()
    }

    // =========================================================================
    // ATTACH / DETACH
    // =========================================================================

    /// Attach the view; the host insertion happens in the mount queue.
    pub fn attach(&self, flags: u32) {
        if self.is_attached() {
            return;
        }
        self.lifecycle.begin_attach();
        self.set(IS_ATTACHING);
        if let Some(this) = self.this() {
            self.lifecycle.enqueue_mount(this);
        }
        self.clear(IS_ATTACHING | IS_CACHED);
        self.set(IS_ATTACHED);
        self.lifecycle.end_attach(flags | FROM_ATTACH);
    }

    /// Detach the view. When a parent already queued its own removal the host
    /// nodes go with it.
    pub fn detach(&self, flags: u32) {
        if !self.is_attached() {
            return;
        }
        self.lifecycle.begin_detach();
        self.set(IS_DETACHING);
        if flags & PARENT_UNMOUNT_QUEUED == 0 {
            if let Some(this) = self.this() {
                self.lifecycle.enqueue_unmount(this);
            }
        }
        self.clear(IS_DETACHING | IS_ATTACHED);
        self.lifecycle.end_detach(flags | FROM_DETACH);
    }

    // =========================================================================
    // CACHE
    // =========================================================================

    /// Mark the view as no longer wanted by its owner.
    ///
    /// An attached view reports whether its factory will take it back once
    /// it unmounts. A detached view is unmounted right away.
    pub fn release(&self, flags: u32) -> bool {
        self.is_free.set(true);
        if self.is_attached() {
            return self
                .factory()
                .is_some_and(|factory| factory.can_return_to_cache());
        }
        LifecycleNode::unmount(self, flags)
    }

    pub fn cache(&self, _flags: u32) {
        self.set(IS_CACHED);
    }

    pub(crate) fn take_from_cache(&self) {
        self.is_free.set(false);
        self.clear(IS_CACHED);
    }
}

// =============================================================================
// BIND / UNBIND
// =============================================================================

impl Bindable for View {
    fn bind(&self, flags: u32, scope: &Rc<Scope>) -> Result<()> {
        if self.is_bound() {
            let same = self
                .scope
                .borrow()
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(current, scope));
            if same {
                return Ok(());
            }
            self.unbind(flags | FROM_BIND);
        }

        self.lifecycle.begin_bind();
        self.set(IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());

        let result = self
            .bindings
            .iter()
            .try_for_each(|binding| binding.bind(flags | FROM_BIND, scope));

        self.clear(IS_BINDING);
        if result.is_ok() {
            self.set(IS_BOUND);
        }
        self.lifecycle.end_bind(flags | FROM_BIND);
        result
    }

    fn unbind(&self, flags: u32) {
        if !self.is_bound() {
            return;
        }
        self.lifecycle.begin_unbind();
        self.set(IS_UNBINDING);
        for binding in self.bindings.iter().rev() {
            binding.unbind(flags | FROM_UNBIND);
        }
        *self.scope.borrow_mut() = None;
        self.clear(IS_UNBINDING | IS_BOUND);
        self.lifecycle.end_unbind(flags | FROM_UNBIND);
    }

    fn is_bound(&self) -> bool {
        self.has(IS_BOUND)
    }
}

// =============================================================================
// QUEUE CALLBACKS
// =============================================================================

impl LifecycleNode for View {
    fn hooks(&self) -> u32 {
        HOOK_MOUNT | HOOK_UNMOUNT | HOOK_UNBIND_AFTER_DETACH
    }

    fn mount(&self, _flags: u32) {
        if self.is_mounted() {
            return;
        }
        self.nodes.mount();
        self.set(IS_MOUNTED);
    }

    /// Remove the host nodes. A released view goes back to its factory cache
    /// if there is room; returns whether it did.
    fn unmount(&self, _flags: u32) -> bool {
        if !self.is_mounted() {
            return false;
        }
        self.nodes.unmount();
        self.clear(IS_MOUNTED);
        if !self.is_free.replace(false) {
            return false;
        }
        match (self.factory(), self.this()) {
            (Some(factory), Some(this)) => factory.try_return_to_cache(&this),
            _ => false,
        }
    }

    fn unbind_after_detach(&self, flags: u32) {
        self.unbind(flags);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Nodes {
        mounted: Cell<u32>,
        unmounted: Cell<u32>,
    }

    impl NodeSequence for Nodes {
        fn mount(&self) {
            self.mounted.set(self.mounted.get() + 1);
        }
        fn unmount(&self) {
            self.unmounted.set(self.unmounted.get() + 1);
        }
    }

    #[derive(Default)]
    struct FakeBinding {
        bound: Cell<bool>,
    }

    impl Bindable for FakeBinding {
        fn bind(&self, _flags: u32, _scope: &Rc<Scope>) -> Result<()> {
            self.bound.set(true);
            Ok(())
        }
        fn unbind(&self, _flags: u32) {
            self.bound.set(false);
        }
        fn is_bound(&self) -> bool {
            self.bound.get()
        }
    }

    fn view() -> (Rc<View>, Rc<Nodes>, Rc<FakeBinding>, Rc<Lifecycle>) {
        let lifecycle = Lifecycle::new();
        let nodes = Rc::new(Nodes::default());
        let binding = Rc::new(FakeBinding::default());
        let view = View::new(
            lifecycle.clone(),
            ViewParts {
                nodes: nodes.clone(),
                bindings: vec![binding.clone() as Rc<dyn Bindable>],
            },
        );
        (view, nodes, binding, lifecycle)
    }

    #[test]
    fn bind_and_unbind_children() {
        let (view, _nodes, binding, _lifecycle) = view();
        let scope = Scope::create(crate::core::value::Value::Null, None);
        view.bind(NONE, &scope).unwrap();
        assert!(view.is_bound());
        assert!(binding.is_bound());

        view.unbind(NONE);
        view.unbind(NONE);
        assert!(!view.is_bound());
        assert!(!binding.is_bound());
    }

    #[test]
    fn attach_mounts_once() {
        let (view, nodes, _binding, _lifecycle) = view();
        view.attach(NONE);
        view.attach(NONE);
        assert!(view.is_attached());
        assert!(view.is_mounted());
        assert_eq!(nodes.mounted.get(), 1);

        view.detach(NONE);
        assert!(!view.is_attached());
        assert!(!view.is_mounted());
        assert_eq!(nodes.unmounted.get(), 1);
    }

    #[test]
    fn parent_unmount_leaves_nodes_to_the_parent() {
        let (view, nodes, _binding, _lifecycle) = view();
        view.attach(NONE);
        view.detach(PARENT_UNMOUNT_QUEUED);
        assert!(!view.is_attached());
        assert_eq!(nodes.unmounted.get(), 0);
    }

    #[test]
    fn nested_attach_mounts_at_outer_end() {
        let (view, nodes, _binding, lifecycle) = view();
        lifecycle.begin_attach();
        view.attach(NONE);
        assert_eq!(nodes.mounted.get(), 0);
        lifecycle.end_attach(NONE);
        assert_eq!(nodes.mounted.get(), 1);
    }

    #[test]
    fn releasing_a_detached_view_unmounts_it() {
        let (view, nodes, _binding, _lifecycle) = view();
        view.attach(NONE);
        view.detach(PARENT_UNMOUNT_QUEUED);
        assert!(view.is_mounted());
        assert!(!view.release(NONE));
        assert!(!view.is_mounted());
        assert_eq!(nodes.unmounted.get(), 1);
    }
}
