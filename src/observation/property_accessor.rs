// ============================================================================
// spark-observe - Property Accessors
// Non-observing read/write access for binding targets
// ============================================================================

use std::rc::Rc;

use crate::core::types::{Accessor, HostObject};
use crate::core::value::Value;

/// Plain property access on any value.
pub struct PropertyAccessor {
    target: Value,
    key: Rc<str>,
}

impl PropertyAccessor {
    pub fn new(target: Value, key: &str) -> Rc<Self> {
        Rc::new(Self { target, key: Rc::from(key) })
    }
}

impl Accessor for PropertyAccessor {
    fn get_value(&self) -> Value {
        self.target.get_property(&self.key)
    }

    fn set_value(&self, value: Value, _flags: u32) {
        self.target.set_property(&self.key, value);
    }
}

/// Property access on a host object.
pub struct HostPropertyAccessor {
    host: Rc<dyn HostObject>,
    key: Rc<str>,
}

impl HostPropertyAccessor {
    pub fn new(host: Rc<dyn HostObject>, key: &str) -> Rc<Self> {
        Rc::new(Self { host, key: Rc::from(key) })
    }
}

impl Accessor for HostPropertyAccessor {
    fn get_value(&self) -> Value {
        self.host.get_property(&self.key)
    }

    fn set_value(&self, value: Value, _flags: u32) {
        self.host.set_property(&self.key, value);
    }
}
