// ============================================================================
// spark-observe - Values
// Dynamic value model shared by observers, expressions and bindings
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use super::object::{ObjectRef, WeakObjectRef};
use super::types::HostObject;
use crate::collections::array::{ArrayInner, ObservableArray};
use crate::collections::map::{MapInner, ObservableMap};
use crate::collections::set::{ObservableSet, SetInner};
use crate::observation::cache::ObserverCache;

/// Shared handle to a host-provided object.
pub type HostRef = Rc<dyn HostObject>;

// =============================================================================
// VALUE
// =============================================================================

/// A dynamically typed value.
///
/// Reference kinds (objects, collections, host objects) compare by identity.
/// Numbers compare by SameValueZero: `NaN` equals `NaN` and `+0` equals `-0`.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ObservableArray),
    Map(ObservableMap),
    Set(ObservableSet),
    Host(HostRef),
}

impl Value {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Host(_) => "host",
        }
    }

    /// True for values that can carry properties and observers.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Array(_) | Value::Map(_) | Value::Set(_) | Value::Host(_)
        )
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ObservableArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Numeric coercion for arithmetic operators.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String coercion used for display and for computed property keys.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(a) => a
                .to_vec()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object Map]".to_string(),
            Value::Set(_) => "[object Set]".to_string(),
            Value::Host(_) => "[object Host]".to_string(),
        }
    }

    /// Array index interpretation of a property key.
    pub(crate) fn parse_index(key: &str) -> Option<usize> {
        if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
            return None;
        }
        key.parse().ok()
    }

    // =========================================================================
    // PROPERTY ACCESS
    // =========================================================================

    /// Read a named property.
    ///
    /// Reads on observable objects and collections are reported to the active
    /// dependency collector.
    pub fn get_property(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.get(key),
            Value::Array(a) => {
                if key == "length" {
                    Value::from(a.len())
                } else if let Some(index) = Value::parse_index(key) {
                    a.get(index).unwrap_or_default()
                } else {
                    Value::Undefined
                }
            }
            Value::Map(m) if key == "size" => Value::from(m.len()),
            Value::Set(s) if key == "size" => Value::from(s.len()),
            Value::String(s) => {
                if key == "length" {
                    Value::from(s.chars().count())
                } else if let Some(index) = Value::parse_index(key) {
                    s.chars().nth(index).map(|c| Value::from(c.to_string())).unwrap_or_default()
                } else {
                    Value::Undefined
                }
            }
            Value::Host(h) => h.get_property(key),
            _ => Value::Undefined,
        }
    }

    /// Write a named property. Writes on values that cannot hold properties
    /// are ignored.
    pub fn set_property(&self, key: &str, value: Value) {
        match self {
            Value::Object(o) => o.set(key, value),
            Value::Array(a) => {
                if key == "length" {
                    let len = value.to_number();
                    if len.is_finite() && len >= 0.0 {
                        a.set_length(len as usize);
                    }
                } else if let Some(index) = Value::parse_index(key) {
                    a.set(index, value);
                }
            }
            Value::Host(h) => h.set_property(key, value),
            _ => {
                tracing::trace!(kind = self.kind(), key, "ignored property write");
            }
        }
    }

    /// Own-property test used by scope resolution.
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Value::Object(o) => o.has(key),
            Value::Array(a) => {
                key == "length" || Value::parse_index(key).is_some_and(|i| i < a.len())
            }
            Value::Map(_) | Value::Set(_) => key == "size",
            _ => false,
        }
    }

    /// Observer cache attached to a reference value.
    pub fn observer_cache(&self) -> Option<&ObserverCache> {
        match self {
            Value::Object(o) => Some(o.observers()),
            Value::Array(a) => Some(a.observers()),
            Value::Map(m) => Some(m.observers()),
            Value::Set(s) => Some(s.observers()),
            Value::Host(h) => Some(h.observers()),
            _ => None,
        }
    }

    /// Default sort order: numbers numerically, everything else by display
    /// string, `undefined` last.
    pub fn compare_default(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Undefined, _) => Ordering::Greater,
            (_, Value::Undefined) => Ordering::Less,
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            _ => a.to_display_string().cmp(&b.to_display_string()),
        }
    }

    /// Weak handle that does not keep a reference value alive.
    pub fn downgrade(&self) -> WeakTarget {
        match self {
            Value::Object(o) => WeakTarget::Object(o.downgrade()),
            Value::Array(a) => WeakTarget::Array(a.downgrade()),
            Value::Map(m) => WeakTarget::Map(m.downgrade()),
            Value::Set(s) => WeakTarget::Set(s.downgrade()),
            Value::Host(h) => WeakTarget::Host(Rc::downgrade(h)),
            primitive => WeakTarget::Primitive(primitive.clone()),
        }
    }

    fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Object(o) => Some(o.as_ptr()),
            Value::Array(a) => Some(a.as_ptr()),
            Value::Map(m) => Some(m.as_ptr()),
            Value::Set(s) => Some(s.as_ptr()),
            Value::Host(h) => Some(Rc::as_ptr(h) as *const ()),
            _ => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// EQUALITY
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if *n == 0.0 {
                    0.0f64.to_bits()
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            _ => {
                if let Some(ptr) = self.identity() {
                    (ptr as usize).hash(state);
                }
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(a) => f.debug_list().entries(a.to_vec_untracked()).finish(),
            Value::Object(o) => write!(f, "Object({:p})", o.as_ptr()),
            Value::Map(m) => write!(f, "Map(size={})", m.len()),
            Value::Set(s) => write!(f, "Set(size={})", s.len()),
            Value::Host(h) => write!(f, "Host({:p})", Rc::as_ptr(h) as *const ()),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<ObservableArray> for Value {
    fn from(a: ObservableArray) -> Self {
        Value::Array(a)
    }
}

impl From<ObservableMap> for Value {
    fn from(m: ObservableMap) -> Self {
        Value::Map(m)
    }
}

impl From<ObservableSet> for Value {
    fn from(s: ObservableSet) -> Self {
        Value::Set(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Undefined, Into::into)
    }
}

// =============================================================================
// WEAK TARGET
// =============================================================================

/// Non-owning handle to an observed value.
///
/// Observers are cached on their target, so they point back weakly.
#[derive(Clone)]
pub enum WeakTarget {
    Object(WeakObjectRef),
    Array(Weak<ArrayInner>),
    Map(Weak<MapInner>),
    Set(Weak<SetInner>),
    Host(Weak<dyn HostObject>),
    Primitive(Value),
}

impl WeakTarget {
    /// Recover the value, `None` once a reference target was dropped.
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            WeakTarget::Object(o) => o.upgrade().map(Value::Object),
            WeakTarget::Array(a) => a.upgrade().map(|inner| Value::Array(ObservableArray::from_inner(inner))),
            WeakTarget::Map(m) => m.upgrade().map(|inner| Value::Map(ObservableMap::from_inner(inner))),
            WeakTarget::Set(s) => s.upgrade().map(|inner| Value::Set(ObservableSet::from_inner(inner))),
            WeakTarget::Host(h) => h.upgrade().map(Value::Host),
            WeakTarget::Primitive(v) => Some(v.clone()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
