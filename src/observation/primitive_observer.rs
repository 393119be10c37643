// ============================================================================
// spark-observe - Primitive Observer
// ============================================================================

use std::any::Any;
use std::rc::Rc;

use crate::core::types::{Accessor, PropertyObserver, PropertySubscriber};
use crate::core::value::Value;

/// Observer for a property of a primitive value.
///
/// Primitives never change in place: writes are ignored, subscriptions are
/// no-ops, and the observer is never cached. Only `length` of a string
/// reads as anything other than `undefined`.
pub struct PrimitiveObserver {
    value: Value,
    key: Rc<str>,
}

impl PrimitiveObserver {
    pub fn new(value: Value, key: &str) -> Rc<Self> {
        Rc::new(Self { value, key: Rc::from(key) })
    }
}

impl Accessor for PrimitiveObserver {
    fn get_value(&self) -> Value {
        match &self.value {
            Value::String(s) if &*self.key == "length" => Value::from(s.chars().count()),
            _ => Value::Undefined,
        }
    }

    fn set_value(&self, _value: Value, _flags: u32) {}
}

impl PropertyObserver for PrimitiveObserver {
    fn subscribe(&self, _subscriber: Rc<dyn PropertySubscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _subscriber: &Rc<dyn PropertySubscriber>) -> bool {
        false
    }

    fn has_subscribers(&self) -> bool {
        false
    }

    fn do_not_cache(&self) -> bool {
        true
    }

    fn as_accessor(self: Rc<Self>) -> Rc<dyn Accessor> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_length_only() {
        let observer = PrimitiveObserver::new(Value::from("hello"), "length");
        assert_eq!(observer.get_value(), Value::from(5));

        let observer = PrimitiveObserver::new(Value::from(3), "length");
        assert_eq!(observer.get_value(), Value::Undefined);
        assert!(observer.do_not_cache());
    }

    #[test]
    fn writes_are_ignored() {
        let observer = PrimitiveObserver::new(Value::from("abc"), "length");
        observer.set_value(Value::from(1), 0);
        assert_eq!(observer.get_value(), Value::from(3));
    }
}
