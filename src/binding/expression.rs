// ============================================================================
// spark-observe - Binding Expressions
// Expression nodes that evaluate, assign and connect against a scope
// ============================================================================
//
// Expressions are built directly as node trees; there is no parser here.
// `connect` walks the same path as `evaluate` and asks the binding to observe
// every property and collection the current evaluation touches. Branching
// nodes only connect the branch that is live right now, which is what lets a
// binding's dependency set change between evaluations.
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::property_binding::PropertyBinding;
use super::resources::ResourceLocator;
use super::scope::Scope;
use crate::core::error::{Error, Result};
use crate::core::object::ObjectRef;
use crate::core::value::Value;

/// Shared handle to an expression node.
pub type Expression = Rc<dyn BindableExpression>;

// =============================================================================
// CONTRACTS
// =============================================================================

/// Node kinds, mostly for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    AccessThis,
    AccessScope,
    AccessMember,
    AccessKeyed,
    PrimitiveLiteral,
    Unary,
    Binary,
    Conditional,
    ValueConverter,
    BindingBehavior,
}

impl ExpressionKind {
    pub fn name(self) -> &'static str {
        match self {
            ExpressionKind::AccessThis => "AccessThis",
            ExpressionKind::AccessScope => "AccessScope",
            ExpressionKind::AccessMember => "AccessMember",
            ExpressionKind::AccessKeyed => "AccessKeyed",
            ExpressionKind::PrimitiveLiteral => "PrimitiveLiteral",
            ExpressionKind::Unary => "Unary",
            ExpressionKind::Binary => "Binary",
            ExpressionKind::Conditional => "Conditional",
            ExpressionKind::ValueConverter => "ValueConverter",
            ExpressionKind::BindingBehavior => "BindingBehavior",
        }
    }
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something that can subscribe itself to what an expression reads.
pub trait Connectable {
    fn observe_property(&self, flags: u32, target: &Value, key: &str) -> Result<()>;

    /// Observe structural changes of a collection (batched channel).
    fn observe_collection(&self, target: &Value);

    fn resources(&self) -> &dyn ResourceLocator;
}

/// A node of a binding expression.
#[allow(unused_variables)]
pub trait BindableExpression {
    fn kind(&self) -> ExpressionKind;

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value>;

    /// Subscribe `binding` to everything the current evaluation touches.
    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()>;

    fn assign(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        Err(Error::NonAssignableExpression(self.kind().name()))
    }

    fn bind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) -> Result<()> {
        Ok(())
    }

    fn unbind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) {}
}

fn evaluate_all(
    expressions: &[Expression],
    flags: u32,
    scope: &Scope,
    resources: &dyn ResourceLocator,
) -> Result<Vec<Value>> {
    expressions
        .iter()
        .map(|e| e.evaluate(flags, scope, resources))
        .collect()
}

// =============================================================================
// ACCESS NODES
// =============================================================================

/// `$this`, or `$parent` chains when `ancestor > 0`.
pub struct AccessThis {
    ancestor: u32,
}

impl AccessThis {
    pub fn new(ancestor: u32) -> Rc<Self> {
        Rc::new(Self { ancestor })
    }
}

impl BindableExpression for AccessThis {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::AccessThis
    }

    fn evaluate(&self, _flags: u32, scope: &Scope, _resources: &dyn ResourceLocator) -> Result<Value> {
        let mut context = Some(scope.override_context());
        for _ in 0..self.ancestor {
            context = context.and_then(|c| c.parent());
        }
        Ok(context
            .map(|c| c.binding_context().clone())
            .unwrap_or_default())
    }

    fn connect(&self, _flags: u32, _scope: &Scope, _binding: &dyn Connectable) -> Result<()> {
        Ok(())
    }
}

/// A bare name resolved through the scope chain.
pub struct AccessScope {
    name: Rc<str>,
    ancestor: u32,
}

impl AccessScope {
    pub fn new(name: &str, ancestor: u32) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            ancestor,
        })
    }
}

impl BindableExpression for AccessScope {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::AccessScope
    }

    fn evaluate(&self, flags: u32, scope: &Scope, _resources: &dyn ResourceLocator) -> Result<Value> {
        let context = Scope::resolve_context(Some(scope), &self.name, self.ancestor, flags)?;
        Ok(context.get_property(&self.name))
    }

    fn assign(&self, flags: u32, scope: &Scope, _resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        let context = Scope::resolve_context(Some(scope), &self.name, self.ancestor, flags)?;
        context.set_property(&self.name, value);
        Ok(())
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        let context = Scope::resolve_context(Some(scope), &self.name, self.ancestor, flags)?;
        if context.is_object_like() {
            binding.observe_property(flags, &context, &self.name)?;
        }
        Ok(())
    }
}

/// `object.name`
pub struct AccessMember {
    object: Expression,
    name: Rc<str>,
}

impl AccessMember {
    pub fn new(object: Expression, name: &str) -> Rc<Self> {
        Rc::new(Self {
            object,
            name: Rc::from(name),
        })
    }
}

impl BindableExpression for AccessMember {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::AccessMember
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        let object = self.object.evaluate(flags, scope, resources)?;
        Ok(object.get_property(&self.name))
    }

    /// Writes through `object`, creating it first when it is missing.
    fn assign(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        let mut object = self.object.evaluate(flags, scope, resources)?;
        if object.is_nullish() {
            object = Value::Object(ObjectRef::new());
            self.object.assign(flags, scope, resources, object.clone())?;
        } else if !object.is_object_like() {
            return Err(Error::NotAnObject {
                kind: object.kind(),
                key: self.name.to_string(),
            });
        }
        object.set_property(&self.name, value);
        Ok(())
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.object.connect(flags, scope, binding)?;
        let object = self.object.evaluate(flags, scope, binding.resources())?;
        if object.is_object_like() {
            binding.observe_property(flags, &object, &self.name)?;
        }
        Ok(())
    }
}

/// `object[key]`
pub struct AccessKeyed {
    object: Expression,
    key: Expression,
}

impl AccessKeyed {
    pub fn new(object: Expression, key: Expression) -> Rc<Self> {
        Rc::new(Self { object, key })
    }
}

impl BindableExpression for AccessKeyed {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::AccessKeyed
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        let object = self.object.evaluate(flags, scope, resources)?;
        let key = self.key.evaluate(flags, scope, resources)?;
        Ok(match &object {
            Value::Map(map) => map.get(&key).unwrap_or_default(),
            Value::Set(set) => Value::from(set.has(&key)),
            other => other.get_property(&key.to_display_string()),
        })
    }

    fn assign(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        let object = self.object.evaluate(flags, scope, resources)?;
        let key = self.key.evaluate(flags, scope, resources)?;
        match &object {
            Value::Map(map) => map.set(key, value),
            other if other.is_object_like() => other.set_property(&key.to_display_string(), value),
            other => {
                return Err(Error::NotAnObject {
                    kind: other.kind(),
                    key: key.to_display_string(),
                });
            }
        }
        Ok(())
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.object.connect(flags, scope, binding)?;
        let object = self.object.evaluate(flags, scope, binding.resources())?;
        if !object.is_object_like() {
            return Ok(());
        }
        self.key.connect(flags, scope, binding)?;
        match &object {
            Value::Array(_) | Value::Map(_) | Value::Set(_) => binding.observe_collection(&object),
            _ => {
                let key = self.key.evaluate(flags, scope, binding.resources())?;
                binding.observe_property(flags, &object, &key.to_display_string())?;
            }
        }
        Ok(())
    }
}

/// A constant.
pub struct PrimitiveLiteral {
    value: Value,
}

impl PrimitiveLiteral {
    pub fn new(value: impl Into<Value>) -> Rc<Self> {
        Rc::new(Self {
            value: value.into(),
        })
    }
}

impl BindableExpression for PrimitiveLiteral {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::PrimitiveLiteral
    }

    fn evaluate(&self, _flags: u32, _scope: &Scope, _resources: &dyn ResourceLocator) -> Result<Value> {
        Ok(self.value.clone())
    }

    fn connect(&self, _flags: u32, _scope: &Scope, _binding: &dyn Connectable) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// OPERATORS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

pub struct Unary {
    operation: UnaryOperator,
    expression: Expression,
}

impl Unary {
    pub fn new(operation: UnaryOperator, expression: Expression) -> Rc<Self> {
        Rc::new(Self {
            operation,
            expression,
        })
    }
}

impl BindableExpression for Unary {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::Unary
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        let value = self.expression.evaluate(flags, scope, resources)?;
        Ok(match self.operation {
            UnaryOperator::Not => Value::Bool(!value.is_truthy()),
            UnaryOperator::Negate => Value::Number(-value.to_number()),
        })
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.expression.connect(flags, scope, binding)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    And,
    Or,
}

pub struct Binary {
    operation: BinaryOperator,
    left: Expression,
    right: Expression,
}

impl Binary {
    pub fn new(operation: BinaryOperator, left: Expression, right: Expression) -> Rc<Self> {
        Rc::new(Self {
            operation,
            left,
            right,
        })
    }

    fn compare(left: &Value, right: &Value) -> Option<Ordering> {
        match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => left.to_number().partial_cmp(&right.to_number()),
        }
    }
}

impl BindableExpression for Binary {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::Binary
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        let left = self.left.evaluate(flags, scope, resources)?;
        // Logical operators yield an operand and skip the right side when decided
        match self.operation {
            BinaryOperator::And if !left.is_truthy() => return Ok(left),
            BinaryOperator::Or if left.is_truthy() => return Ok(left),
            _ => {}
        }
        let right = self.right.evaluate(flags, scope, resources)?;
        Ok(match self.operation {
            BinaryOperator::Add => match (&left, &right) {
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Value::from(left.to_display_string() + &right.to_display_string())
                }
                _ => Value::Number(left.to_number() + right.to_number()),
            },
            BinaryOperator::Subtract => Value::Number(left.to_number() - right.to_number()),
            BinaryOperator::Multiply => Value::Number(left.to_number() * right.to_number()),
            BinaryOperator::Divide => Value::Number(left.to_number() / right.to_number()),
            BinaryOperator::Equals => Value::Bool(left == right),
            BinaryOperator::NotEquals => Value::Bool(left != right),
            BinaryOperator::LessThan => {
                Value::Bool(Self::compare(&left, &right) == Some(Ordering::Less))
            }
            BinaryOperator::GreaterThan => {
                Value::Bool(Self::compare(&left, &right) == Some(Ordering::Greater))
            }
            BinaryOperator::And | BinaryOperator::Or => right,
        })
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.left.connect(flags, scope, binding)?;
        let decided = match self.operation {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = self.left.evaluate(flags, scope, binding.resources())?;
                (self.operation == BinaryOperator::And) != left.is_truthy()
            }
            _ => false,
        };
        if !decided {
            self.right.connect(flags, scope, binding)?;
        }
        Ok(())
    }
}

/// `condition ? yes : no`
pub struct Conditional {
    condition: Expression,
    yes: Expression,
    no: Expression,
}

impl Conditional {
    pub fn new(condition: Expression, yes: Expression, no: Expression) -> Rc<Self> {
        Rc::new(Self { condition, yes, no })
    }
}

impl BindableExpression for Conditional {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::Conditional
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        if self.condition.evaluate(flags, scope, resources)?.is_truthy() {
            self.yes.evaluate(flags, scope, resources)
        } else {
            self.no.evaluate(flags, scope, resources)
        }
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.condition.connect(flags, scope, binding)?;
        if self.condition.evaluate(flags, scope, binding.resources())?.is_truthy() {
            self.yes.connect(flags, scope, binding)
        } else {
            self.no.connect(flags, scope, binding)
        }
    }
}

// =============================================================================
// RESOURCE NODES
// =============================================================================

/// `expression | name:arg1:arg2`
pub struct ValueConverterExpression {
    expression: Expression,
    name: Rc<str>,
    args: Vec<Expression>,
}

impl ValueConverterExpression {
    pub fn new(expression: Expression, name: &str, args: Vec<Expression>) -> Rc<Self> {
        Rc::new(Self {
            expression,
            name: Rc::from(name),
            args,
        })
    }

    fn missing(&self) -> Error {
        Error::MissingValueConverter(self.name.to_string())
    }
}

impl BindableExpression for ValueConverterExpression {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::ValueConverter
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        let converter = resources.value_converter(&self.name).ok_or_else(|| self.missing())?;
        let value = self.expression.evaluate(flags, scope, resources)?;
        let args = evaluate_all(&self.args, flags, scope, resources)?;
        Ok(converter.to_view(value, &args))
    }

    fn assign(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        let converter = resources.value_converter(&self.name).ok_or_else(|| self.missing())?;
        let args = evaluate_all(&self.args, flags, scope, resources)?;
        let value = converter.from_view(value, &args);
        self.expression.assign(flags, scope, resources, value)
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.expression.connect(flags, scope, binding)?;
        for arg in &self.args {
            arg.connect(flags, scope, binding)?;
        }
        Ok(())
    }

    fn bind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) -> Result<()> {
        if binding.resources().value_converter(&self.name).is_none() {
            return Err(self.missing());
        }
        self.expression.bind(flags, scope, binding)
    }

    fn unbind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) {
        self.expression.unbind(flags, scope, binding);
    }
}

/// `expression & name:arg1`
pub struct BindingBehaviorExpression {
    expression: Expression,
    name: Rc<str>,
    args: Vec<Expression>,
}

impl BindingBehaviorExpression {
    pub fn new(expression: Expression, name: &str, args: Vec<Expression>) -> Rc<Self> {
        Rc::new(Self {
            expression,
            name: Rc::from(name),
            args,
        })
    }
}

impl BindableExpression for BindingBehaviorExpression {
    fn kind(&self) -> ExpressionKind {
        ExpressionKind::BindingBehavior
    }

    fn evaluate(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator) -> Result<Value> {
        self.expression.evaluate(flags, scope, resources)
    }

    fn assign(&self, flags: u32, scope: &Scope, resources: &dyn ResourceLocator, value: Value) -> Result<()> {
        self.expression.assign(flags, scope, resources, value)
    }

    fn connect(&self, flags: u32, scope: &Scope, binding: &dyn Connectable) -> Result<()> {
        self.expression.connect(flags, scope, binding)
    }

    fn bind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) -> Result<()> {
        let behavior = binding
            .resources()
            .binding_behavior(&self.name)
            .ok_or_else(|| Error::MissingBindingBehavior(self.name.to_string()))?;
        if !binding.mark_behavior(&self.name) {
            return Err(Error::BehaviorAlreadyApplied(self.name.to_string()));
        }
        let args = evaluate_all(&self.args, flags, scope, binding.resources())?;
        behavior.bind(flags, scope, binding, &args)?;
        self.expression.bind(flags, scope, binding)
    }

    fn unbind(&self, flags: u32, scope: &Scope, binding: &PropertyBinding) {
        if let Some(behavior) = binding.resources().binding_behavior(&self.name) {
            behavior.unbind(flags, scope, binding);
        }
        binding.unmark_behavior(&self.name);
        self.expression.unbind(flags, scope, binding);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::resources::{Resources, ValueConverter};
    use crate::core::constants::NONE;
    use std::cell::RefCell;

    fn scope_of(pairs: &[(&str, Value)]) -> Rc<Scope> {
        let context = ObjectRef::new();
        for (key, value) in pairs {
            context.set(key, value.clone());
        }
        Scope::create(Value::Object(context), None)
    }

    fn scope_name(name: &str) -> Expression {
        AccessScope::new(name, 0)
    }

    /// Records every observation request.
    #[derive(Default)]
    struct Recorder {
        resources: Resources,
        properties: RefCell<Vec<String>>,
        collections: RefCell<usize>,
    }

    impl Connectable for Recorder {
        fn observe_property(&self, _flags: u32, _target: &Value, key: &str) -> Result<()> {
            self.properties.borrow_mut().push(key.to_string());
            Ok(())
        }

        fn observe_collection(&self, _target: &Value) {
            *self.collections.borrow_mut() += 1;
        }

        fn resources(&self) -> &dyn ResourceLocator {
            &self.resources
        }
    }

    #[test]
    fn member_access_reads_and_connects() {
        let inner = ObjectRef::from_pairs([("b", 1)]);
        let scope = scope_of(&[("a", Value::from(inner))]);
        let expr = AccessMember::new(scope_name("a"), "b");
        let recorder = Recorder::default();

        assert_eq!(expr.evaluate(NONE, &scope, &recorder.resources).unwrap(), Value::from(1));
        expr.connect(NONE, &scope, &recorder).unwrap();
        assert_eq!(*recorder.properties.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn member_assign_creates_missing_object() {
        let scope = scope_of(&[]);
        let expr = AccessMember::new(scope_name("a"), "b");
        let resources = Resources::default();
        expr.assign(NONE, &scope, &resources, Value::from(5)).unwrap();
        assert_eq!(expr.evaluate(NONE, &scope, &resources).unwrap(), Value::from(5));

        let literal = PrimitiveLiteral::new(1);
        assert_eq!(
            literal.assign(NONE, &scope, &resources, Value::Null),
            Err(Error::NonAssignableExpression("PrimitiveLiteral"))
        );
    }

    #[test]
    fn conditional_connects_live_branch_only() {
        let scope = scope_of(&[("flag", Value::from(true)), ("x", Value::from(1)), ("y", Value::from(2))]);
        let expr = Conditional::new(scope_name("flag"), scope_name("x"), scope_name("y"));
        let recorder = Recorder::default();
        expr.connect(NONE, &scope, &recorder).unwrap();
        assert_eq!(*recorder.properties.borrow(), vec!["flag", "x"]);
    }

    #[test]
    fn logical_operators_short_circuit() {
        let scope = scope_of(&[("a", Value::from(0)), ("b", Value::from("b"))]);
        let resources = Resources::default();
        let and = Binary::new(BinaryOperator::And, scope_name("a"), scope_name("b"));
        let or = Binary::new(BinaryOperator::Or, scope_name("a"), scope_name("b"));
        assert_eq!(and.evaluate(NONE, &scope, &resources).unwrap(), Value::from(0));
        assert_eq!(or.evaluate(NONE, &scope, &resources).unwrap(), Value::from("b"));

        let recorder = Recorder::default();
        and.connect(NONE, &scope, &recorder).unwrap();
        assert_eq!(*recorder.properties.borrow(), vec!["a"]);
    }

    #[test]
    fn arithmetic_and_comparison() {
        let scope = scope_of(&[("n", Value::from(4))]);
        let resources = Resources::default();
        let cases = [
            (BinaryOperator::Add, Value::from(6)),
            (BinaryOperator::Subtract, Value::from(2)),
            (BinaryOperator::Multiply, Value::from(8)),
            (BinaryOperator::Divide, Value::from(2)),
            (BinaryOperator::GreaterThan, Value::from(true)),
            (BinaryOperator::LessThan, Value::from(false)),
            (BinaryOperator::Equals, Value::from(false)),
            (BinaryOperator::NotEquals, Value::from(true)),
        ];
        for (op, expected) in cases {
            let expr = Binary::new(op, scope_name("n"), PrimitiveLiteral::new(2));
            assert_eq!(expr.evaluate(NONE, &scope, &resources).unwrap(), expected, "{op:?}");
        }

        let concat = Binary::new(BinaryOperator::Add, PrimitiveLiteral::new("n="), scope_name("n"));
        assert_eq!(concat.evaluate(NONE, &scope, &resources).unwrap(), Value::from("n=4"));

        let not = Unary::new(UnaryOperator::Not, scope_name("n"));
        assert_eq!(not.evaluate(NONE, &scope, &resources).unwrap(), Value::from(false));
    }

    #[test]
    fn keyed_access_observes_collections() {
        let items: crate::collections::ObservableArray =
            [Value::from(10), Value::from(20)].into_iter().collect();
        let scope = scope_of(&[("items", Value::from(items)), ("i", Value::from(1))]);
        let expr = AccessKeyed::new(scope_name("items"), scope_name("i"));
        let recorder = Recorder::default();

        assert_eq!(expr.evaluate(NONE, &scope, &recorder.resources).unwrap(), Value::from(20));
        expr.connect(NONE, &scope, &recorder).unwrap();
        assert_eq!(*recorder.properties.borrow(), vec!["items", "i"]);
        assert_eq!(*recorder.collections.borrow(), 1);

        expr.assign(NONE, &scope, &recorder.resources, Value::from(99)).unwrap();
        assert_eq!(expr.evaluate(NONE, &scope, &recorder.resources).unwrap(), Value::from(99));
    }

    #[test]
    fn value_converter_round_trip() {
        struct Double;
        impl ValueConverter for Double {
            fn to_view(&self, value: Value, _args: &[Value]) -> Value {
                Value::Number(value.to_number() * 2.0)
            }
            fn from_view(&self, value: Value, _args: &[Value]) -> Value {
                Value::Number(value.to_number() / 2.0)
            }
        }

        let scope = scope_of(&[("n", Value::from(3))]);
        let resources = Resources::default();
        let expr = ValueConverterExpression::new(scope_name("n"), "double", vec![]);
        assert_eq!(
            expr.evaluate(NONE, &scope, &resources),
            Err(Error::MissingValueConverter("double".into()))
        );

        resources.register_value_converter("double", Rc::new(Double));
        assert_eq!(expr.evaluate(NONE, &scope, &resources).unwrap(), Value::from(6));
        expr.assign(NONE, &scope, &resources, Value::from(10)).unwrap();
        assert_eq!(scope_name("n").evaluate(NONE, &scope, &resources).unwrap(), Value::from(5));
    }

    #[test]
    fn access_this_walks_ancestors() {
        let root_ctx = Value::Object(ObjectRef::new());
        let root = Scope::create(root_ctx.clone(), None);
        let child_ctx = Value::Object(ObjectRef::new());
        let child = Scope::from_parent(Some(&root), child_ctx.clone()).unwrap();
        let resources = Resources::default();

        assert_eq!(AccessThis::new(0).evaluate(NONE, &child, &resources).unwrap(), child_ctx);
        assert_eq!(AccessThis::new(1).evaluate(NONE, &child, &resources).unwrap(), root_ctx);
        assert_eq!(AccessThis::new(2).evaluate(NONE, &child, &resources).unwrap(), Value::Undefined);
    }
}
