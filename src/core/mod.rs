// ============================================================================
// spark-observe - Core Module
// Value model, flags, traits and thread-local context
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;
pub mod object;
pub mod types;
pub mod value;

pub use constants::*;
pub use error::{Error, Result};
pub use object::{AccessorProperty, ComputedOverrides, ObjectRef, Property, WeakObjectRef};
pub use types::*;
pub use value::{HostRef, Value, WeakTarget};
