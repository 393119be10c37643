// ============================================================================
// spark-observe - Binding
// Scopes, expressions and the connect protocol
// ============================================================================

pub mod expression;
pub mod property_binding;
pub mod resources;
pub mod scope;
pub mod slots;

pub use expression::{
    AccessKeyed, AccessMember, AccessScope, AccessThis, Binary, BinaryOperator, BindableExpression,
    BindingBehaviorExpression, Conditional, Connectable, Expression, ExpressionKind, PrimitiveLiteral,
    Unary, UnaryOperator, ValueConverterExpression,
};
pub use property_binding::{Bindable, BindingMode, PropertyBinding};
pub use resources::{BindingBehavior, BindingModeBehavior, ResourceLocator, Resources, ValueConverter};
pub use scope::{OverrideContext, Scope};
pub use slots::{Observed, ObserverSlots};
