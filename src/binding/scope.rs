// ============================================================================
// spark-observe - Scope
// Binding contexts and the override-context ancestor chain
// ============================================================================

use std::rc::Rc;

use crate::core::constants::ALLOW_PARENT_SCOPE_TRAVERSAL;
use crate::core::error::{Error, Result};
use crate::core::object::ObjectRef;
use crate::core::value::Value;

/// One link of the ancestor chain.
///
/// The bag holds framework-provided names (such as `$index`) that shadow the
/// binding context. It is a synthetic binding context, so its properties are
/// always observed through setter observers.
pub struct OverrideContext {
    bag: ObjectRef,
    binding_context: Value,
    parent: Option<Rc<OverrideContext>>,
}

impl OverrideContext {
    pub fn create(binding_context: Value, parent: Option<Rc<OverrideContext>>) -> Rc<Self> {
        Rc::new(Self {
            bag: ObjectRef::binding_context(),
            binding_context,
            parent,
        })
    }

    pub fn bag(&self) -> &ObjectRef {
        &self.bag
    }

    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    pub fn parent(&self) -> Option<&Rc<OverrideContext>> {
        self.parent.as_ref()
    }

    fn declares(&self, name: &str) -> bool {
        self.bag.has(name)
    }

    fn context_declares(&self, name: &str) -> bool {
        self.binding_context.is_object_like() && self.binding_context.has_property(name)
    }

    /// The bag if it declares `name`, otherwise the binding context.
    fn owner_of(&self, name: &str) -> Value {
        if self.declares(name) {
            Value::Object(self.bag.clone())
        } else {
            self.binding_context.clone()
        }
    }
}

/// Evaluation environment of an expression.
pub struct Scope {
    binding_context: Value,
    override_context: Rc<OverrideContext>,
    parent_scope: Option<Rc<Scope>>,
}

impl Scope {
    /// Root scope. Without an override context a fresh one is created.
    pub fn create(binding_context: Value, override_context: Option<Rc<OverrideContext>>) -> Rc<Self> {
        let override_context = override_context
            .unwrap_or_else(|| OverrideContext::create(binding_context.clone(), None));
        Rc::new(Self {
            binding_context,
            override_context,
            parent_scope: None,
        })
    }

    /// Child scope whose override context links to the parent's chain.
    pub fn from_parent(parent: Option<&Rc<Scope>>, binding_context: Value) -> Result<Rc<Self>> {
        let parent = parent.ok_or(Error::UndefinedScope)?;
        let override_context = OverrideContext::create(
            binding_context.clone(),
            Some(parent.override_context.clone()),
        );
        Ok(Rc::new(Self {
            binding_context,
            override_context,
            parent_scope: None,
        }))
    }

    /// Same scope with a link across an encapsulation boundary.
    pub fn with_parent_scope(self: &Rc<Self>, parent_scope: Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            binding_context: self.binding_context.clone(),
            override_context: self.override_context.clone(),
            parent_scope: Some(parent_scope),
        })
    }

    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    pub fn override_context(&self) -> &Rc<OverrideContext> {
        &self.override_context
    }

    pub fn parent_scope(&self) -> Option<&Rc<Scope>> {
        self.parent_scope.as_ref()
    }

    /// Nearest link of the override chain declaring `name`.
    fn find_owner(&self, name: &str) -> Option<Value> {
        let mut context = Some(&self.override_context);
        while let Some(current) = context {
            if current.declares(name) || current.context_declares(name) {
                return Some(current.owner_of(name));
            }
            context = current.parent.as_ref();
        }
        None
    }

    /// Object that owns `name` for reads and writes from `scope`.
    ///
    /// `ancestor` hops up the override chain first. With no hops, the chain is
    /// searched for the nearest link declaring `name`; failing that, one hop
    /// into the parent scope is allowed when `ALLOW_PARENT_SCOPE_TRAVERSAL` is
    /// set, and the scope's own binding context is the final fallback.
    pub fn resolve_context(scope: Option<&Scope>, name: &str, ancestor: u32, flags: u32) -> Result<Value> {
        let scope = scope.ok_or(Error::NullScope)?;
        let mut context = Some(&scope.override_context);

        if ancestor > 0 {
            for _ in 0..ancestor {
                match context.and_then(|c| c.parent.as_ref()) {
                    Some(parent) => context = Some(parent),
                    None => return Ok(Value::Undefined),
                }
            }
            return Ok(context.map(|c| c.owner_of(name)).unwrap_or_default());
        }

        if let Some(owner) = scope.find_owner(name) {
            return Ok(owner);
        }

        if flags & ALLOW_PARENT_SCOPE_TRAVERSAL != 0 {
            if let Some(owner) = scope.parent_scope.as_ref().and_then(|p| p.find_owner(name)) {
                return Ok(owner);
            }
        }

        if scope.binding_context.is_nullish() {
            Ok(Value::Object(scope.override_context.bag.clone()))
        } else {
            Ok(scope.binding_context.clone())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
