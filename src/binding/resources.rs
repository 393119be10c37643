// ============================================================================
// spark-observe - Binding Resources
// Value converters, binding behaviors and the registry that resolves them
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::property_binding::{BindingMode, PropertyBinding};
use super::scope::Scope;
use crate::core::error::Result;
use crate::core::value::Value;

// =============================================================================
// RESOURCE TRAITS
// =============================================================================

/// Converts values flowing between source and target.
pub trait ValueConverter {
    fn to_view(&self, value: Value, args: &[Value]) -> Value;

    fn from_view(&self, value: Value, _args: &[Value]) -> Value {
        value
    }
}

/// Adjusts a binding for as long as it stays bound.
pub trait BindingBehavior {
    fn bind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding, args: &[Value]) -> Result<()>;

    fn unbind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding);
}

/// Resolves named resources for expressions.
pub trait ResourceLocator {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>>;

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>>;
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Name-keyed resource registry.
#[derive(Default)]
pub struct Resources {
    converters: RefCell<FxHashMap<Rc<str>, Rc<dyn ValueConverter>>>,
    behaviors: RefCell<FxHashMap<Rc<str>, Rc<dyn BindingBehavior>>>,
}

impl Resources {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registry preloaded with the binding-mode behaviors
    /// (`oneTime`, `toView`, `fromView`, `twoWay`).
    pub fn with_defaults() -> Rc<Self> {
        let resources = Self::new();
        for (name, mode) in [
            ("oneTime", BindingMode::OneTime),
            ("toView", BindingMode::ToView),
            ("fromView", BindingMode::FromView),
            ("twoWay", BindingMode::TwoWay),
        ] {
            resources.register_binding_behavior(name, Rc::new(BindingModeBehavior::new(mode)));
        }
        resources
    }

    pub fn register_value_converter(&self, name: &str, converter: Rc<dyn ValueConverter>) {
        self.converters.borrow_mut().insert(Rc::from(name), converter);
    }

    pub fn register_binding_behavior(&self, name: &str, behavior: Rc<dyn BindingBehavior>) {
        self.behaviors.borrow_mut().insert(Rc::from(name), behavior);
    }
}

impl ResourceLocator for Resources {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        self.converters.borrow().get(name).cloned()
    }

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>> {
        self.behaviors.borrow().get(name).cloned()
    }
}

// =============================================================================
// BUILT-IN BEHAVIORS
// =============================================================================

/// Forces a binding mode while applied; the original mode returns on unbind.
pub struct BindingModeBehavior {
    mode: BindingMode,
}

impl BindingModeBehavior {
    pub fn new(mode: BindingMode) -> Self {
        Self { mode }
    }
}

impl BindingBehavior for BindingModeBehavior {
    fn bind(&self, _flags: u32, _scope: &Scope, binding: &PropertyBinding, _args: &[Value]) -> Result<()> {
        binding.override_mode(self.mode);
        Ok(())
    }

    fn unbind(&self, _flags: u32, _scope: &Scope, binding: &PropertyBinding) {
        binding.restore_mode();
    }
}

// =============================================================================
// TESTS
// =============================================================================
