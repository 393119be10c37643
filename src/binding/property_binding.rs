// ============================================================================
// spark-observe - Property Binding
// Keeps one target property in sync with a source expression
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;

use super::expression::{Connectable, Expression};
use super::resources::ResourceLocator;
use super::scope::Scope;
use super::slots::{Observed, ObserverSlots};
use crate::collections::index_map::IndexMap;
use crate::core::constants::*;
use crate::core::error::{Error, Result};
use crate::core::types::{Accessor, BatchedCollectionSubscriber, PropertyObserver, PropertySubscriber};
use crate::core::value::Value;
use crate::lifecycle::{Lifecycle, LifecycleNode};
use crate::observation::locator::ObserverLocator;

// =============================================================================
// BINDABLE
// =============================================================================

/// Anything a view binds and unbinds along with itself.
pub trait Bindable {
    fn bind(&self, flags: u32, scope: &Rc<Scope>) -> Result<()>;

    fn unbind(&self, flags: u32);

    fn is_bound(&self) -> bool;
}

/// Direction of data flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingMode {
    /// Evaluate at bind, never observe
    OneTime,
    /// Source to target
    ToView,
    /// Target to source
    FromView,
    /// Both directions
    TwoWay,
}

impl BindingMode {
    pub fn to_view(self) -> bool {
        matches!(self, BindingMode::ToView | BindingMode::TwoWay)
    }

    pub fn from_view(self) -> bool {
        matches!(self, BindingMode::FromView | BindingMode::TwoWay)
    }
}

// =============================================================================
// TARGET SUBSCRIBER
// =============================================================================

/// Forwards target-side changes to the binding's source.
struct TargetSubscriber {
    binding: Weak<PropertyBinding>,
}

impl PropertySubscriber for TargetSubscriber {
    fn handle_change(&self, new_value: &Value, _old_value: &Value, flags: u32) {
        if let Some(binding) = self.binding.upgrade() {
            binding.handle_target_change(new_value, flags);
        }
    }
}

// =============================================================================
// PROPERTY BINDING
// =============================================================================

/// Binds `target.target_property` to a source expression.
///
/// Every re-evaluation bumps `version`, reconnects the expression and then
/// releases the dependencies the new evaluation no longer touched.
pub struct PropertyBinding {
    self_weak: Weak<PropertyBinding>,

    source_expression: Expression,
    target: Value,
    target_property: Rc<str>,
    declared_mode: BindingMode,
    mode: Cell<BindingMode>,

    observer_locator: Rc<ObserverLocator>,
    resources: Rc<dyn ResourceLocator>,

    scope: RefCell<Option<Rc<Scope>>>,
    state: Cell<u32>,
    persistent_flags: Cell<u32>,
    version: Cell<u64>,
    slots: ObserverSlots,

    target_accessor: RefCell<Option<Rc<dyn Accessor>>>,
    target_observer: RefCell<Option<(Rc<dyn PropertyObserver>, Rc<dyn PropertySubscriber>)>>,
    updating_target: Cell<bool>,

    behaviors: RefCell<FxHashSet<Rc<str>>>,
}

impl PropertyBinding {
    pub fn new(
        source_expression: Expression,
        target: Value,
        target_property: &str,
        mode: BindingMode,
        observer_locator: Rc<ObserverLocator>,
        resources: Rc<dyn ResourceLocator>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            self_weak: self_weak.clone(),
            source_expression,
            target,
            target_property: Rc::from(target_property),
            declared_mode: mode,
            mode: Cell::new(mode),
            observer_locator,
            resources,
            scope: RefCell::new(None),
            state: Cell::new(0),
            persistent_flags: Cell::new(NONE),
            version: Cell::new(0),
            slots: ObserverSlots::new(),
            target_accessor: RefCell::new(None),
            target_observer: RefCell::new(None),
            updating_target: Cell::new(false),
            behaviors: RefCell::new(FxHashSet::default()),
        })
    }

    pub fn mode(&self) -> BindingMode {
        self.mode.get()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    pub fn resources(&self) -> &dyn ResourceLocator {
        self.resources.as_ref()
    }

    fn lifecycle(&self) -> &Rc<Lifecycle> {
        self.observer_locator.lifecycle()
    }

    /// Number of dependencies currently subscribed.
    pub fn observed_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the binding currently subscribes to `observer`.
    pub fn is_observing(&self, observer: &Rc<dyn PropertyObserver>) -> bool {
        self.slots.contains(&Observed::Property(observer.clone()))
    }

    fn current_scope(&self) -> Option<Rc<Scope>> {
        self.scope.borrow().clone()
    }

    // =========================================================================
    // BEHAVIOR SUPPORT
    // =========================================================================

    /// Switch mode while a behavior is applied.
    pub fn override_mode(&self, mode: BindingMode) {
        self.mode.set(mode);
    }

    pub fn restore_mode(&self) {
        self.mode.set(self.declared_mode);
    }

    /// Record that a behavior was applied. False if it already was.
    pub(crate) fn mark_behavior(&self, name: &str) -> bool {
        self.behaviors.borrow_mut().insert(Rc::from(name))
    }

    pub(crate) fn unmark_behavior(&self, name: &str) {
        self.behaviors.borrow_mut().remove(name);
    }

    // =========================================================================
    // UPDATES
    // =========================================================================

    /// Write `value` to the target. Skipped while render updates are suspended.
    pub fn update_target(&self, value: Value, flags: u32) {
        if flags & DO_NOT_UPDATE_DOM != 0 {
            return;
        }
        let accessor = self.target_accessor.borrow().clone();
        if let Some(accessor) = accessor {
            self.updating_target.set(true);
            accessor.set_value(value, flags | UPDATE_TARGET_INSTANCE);
            self.updating_target.set(false);
        }
    }

    /// Assign `value` back through the source expression.
    pub fn update_source(&self, value: Value, flags: u32) -> Result<()> {
        let scope = self.current_scope().ok_or(Error::NullScope)?;
        self.source_expression.assign(
            flags | UPDATE_SOURCE_EXPRESSION,
            &scope,
            self.resources(),
            value,
        )
    }

    /// Re-evaluate the source, refresh the target if the value moved, then
    /// reconnect.
    fn refresh(&self, flags: u32) -> Result<()> {
        let Some(scope) = self.current_scope() else {
            return Ok(());
        };
        let mode = self.mode();
        if !mode.to_view() {
            return Ok(());
        }
        let flags = flags | self.persistent_flags.get();
        let value = self.source_expression.evaluate(flags, &scope, self.resources())?;
        let previous = self
            .target_accessor
            .borrow()
            .as_ref()
            .map(|accessor| accessor.get_value())
            .unwrap_or_default();
        if value != previous {
            self.update_target(value, flags);
        }
        self.reconnect(flags, &scope)
    }

    fn handle_target_change(&self, value: &Value, flags: u32) {
        if !self.is_bound() || self.updating_target.get() || !self.mode().from_view() {
            return;
        }
        if let Err(error) = self.update_source(value.clone(), flags) {
            tracing::error!(property = %self.target_property, %error, "failed to update binding source");
        }
    }

    fn report(&self, result: Result<()>) {
        if let Err(error) = result {
            tracing::error!(property = %self.target_property, %error, "binding update failed");
        }
    }

    // =========================================================================
    // CONNECT
    // =========================================================================

    fn reconnect(&self, flags: u32, scope: &Scope) -> Result<()> {
        self.version.set(self.version.get() + 1);
        self.source_expression.connect(flags, scope, self)?;
        self.unobserve(false);
        Ok(())
    }

    /// Release dependencies. With `all == false` only those not touched by the
    /// latest evaluation are released.
    pub fn unobserve(&self, all: bool) {
        let stale = if all {
            self.slots.clear()
        } else {
            self.slots.sweep(self.version.get())
        };
        if stale.is_empty() {
            return;
        }
        let Some(this) = self.self_weak.upgrade() else {
            return;
        };
        let property_subscriber: Rc<dyn PropertySubscriber> = this.clone();
        let collection_subscriber: Rc<dyn BatchedCollectionSubscriber> = this;
        for observed in stale {
            match observed {
                Observed::Property(observer) => {
                    observer.unsubscribe(&property_subscriber);
                }
                Observed::Collection(observer) => {
                    observer.unsubscribe_batched(&collection_subscriber);
                }
            }
        }
    }
}

// =============================================================================
// BIND / UNBIND
// =============================================================================

impl Bindable for PropertyBinding {
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

        self.state.set(self.state.get() | IS_BINDING);
        self.persistent_flags.set(flags & PERSISTENT_BINDING_FLAGS);
        *self.scope.borrow_mut() = Some(scope.clone());

        let result = self.bind_core(flags, scope);
        self.state.set(self.state.get() & !IS_BINDING);
        if result.is_err() {
            self.release_target();
            *self.scope.borrow_mut() = None;
            self.behaviors.borrow_mut().clear();
            self.restore_mode();
            return result;
        }
        self.state.set(self.state.get() | IS_BOUND);

        if self.mode().to_view() {
            match (self.self_weak.upgrade(), self.lifecycle().is_binding()) {
                (Some(this), true) => {
                    self.lifecycle().enqueue_connect(this);
                }
                _ => self.connect(flags),
            }
        }
        Ok(())
    }

    fn unbind(&self, flags: u32) {
        if !self.is_bound() {
            return;
        }
        self.state.set(self.state.get() | IS_UNBINDING);

        if let Some(scope) = self.current_scope() {
            self.source_expression.unbind(flags, &scope, self);
        }
        *self.scope.borrow_mut() = None;

        self.release_target();
        self.unobserve(true);

        self.state.set(self.state.get() & !(IS_BOUND | IS_UNBINDING));
    }

    fn is_bound(&self) -> bool {
        self.state.get() & IS_BOUND != 0
    }
}

impl PropertyBinding {
    fn release_target(&self) {
        let target_observer = self.target_observer.borrow_mut().take();
        if let Some((observer, subscriber)) = target_observer {
            observer.unsubscribe(&subscriber);
        }
        *self.target_accessor.borrow_mut() = None;
    }

    fn bind_core(&self, flags: u32, scope: &Rc<Scope>) -> Result<()> {
        self.source_expression.bind(flags, scope, self)?;

        let mode = self.mode();
        let target_flags = flags | self.persistent_flags.get();
        if mode.from_view() {
            let observer =
                self.observer_locator
                    .get_observer(target_flags, &self.target, &self.target_property)?;
            let subscriber: Rc<dyn PropertySubscriber> = Rc::new(TargetSubscriber {
                binding: self.self_weak.clone(),
            });
            observer.subscribe(subscriber.clone());
            *self.target_accessor.borrow_mut() = Some(observer.clone().as_accessor());
            *self.target_observer.borrow_mut() = Some((observer, subscriber));
        } else {
            *self.target_accessor.borrow_mut() =
                Some(
                    self.observer_locator
                        .get_accessor(target_flags, &self.target, &self.target_property),
                );
        }

        if mode != BindingMode::FromView {
            let value = self.source_expression.evaluate(target_flags, scope, self.resources())?;
            self.update_target(value, target_flags);
        }
        Ok(())
    }
}

// =============================================================================
// OBSERVATION
// =============================================================================

impl Connectable for PropertyBinding {
    fn observe_property(&self, flags: u32, target: &Value, key: &str) -> Result<()> {
        let observer = self.observer_locator.get_observer(flags, target, key)?;
        if self.slots.add(Observed::Property(observer.clone()), self.version.get()) {
            if let Some(this) = self.self_weak.upgrade() {
                observer.subscribe(this);
            }
        }
        Ok(())
    }

    fn observe_collection(&self, target: &Value) {
        let Some(observer) = self.observer_locator.collection_observer(target) else {
            return;
        };
        if self.slots.add(Observed::Collection(observer.clone()), self.version.get()) {
            if let Some(this) = self.self_weak.upgrade() {
                observer.subscribe_batched(this);
            }
        }
    }

    fn resources(&self) -> &dyn ResourceLocator {
        self.resources.as_ref()
    }
}

impl PropertySubscriber for PropertyBinding {
    fn handle_change(&self, _new_value: &Value, _old_value: &Value, flags: u32) {
        if !self.is_bound() {
            return;
        }
        self.report(self.refresh(flags));
    }
}

impl BatchedCollectionSubscriber for PropertyBinding {
    fn handle_batched_change(&self, _index_map: &IndexMap, flags: u32) {
        if !self.is_bound() {
            return;
        }
        self.report(self.refresh(flags));
    }
}

impl LifecycleNode for PropertyBinding {
    fn hooks(&self) -> u32 {
        HOOK_CONNECT | HOOK_PATCH
    }

    /// Subscribe to the dependencies of the current evaluation.
    fn connect(&self, flags: u32) {
        if !self.is_bound() || !self.mode().to_view() {
            return;
        }
        if let Some(scope) = self.current_scope() {
            let flags = flags | self.persistent_flags.get();
            self.report(self.reconnect(flags, &scope));
        }
    }

    /// Push the current source value to the target.
    fn patch(&self, flags: u32) {
        if !self.is_bound() {
            return;
        }
        self.report(self.refresh(flags));
    }
}

// =============================================================================
// TESTS
// =============================================================================
