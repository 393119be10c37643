// ============================================================================
// spark-observe - Observation
// Observer locator, property observers and the subscriber registry
// ============================================================================

pub mod cache;
pub mod computed_observer;
pub mod dirty_checker;
pub mod locator;
pub mod primitive_observer;
pub mod property_accessor;
pub mod proxy_observer;
pub mod setter_observer;
pub mod subscribers;

pub use cache::ObserverCache;
pub use computed_observer::ComputedObserver;
pub use dirty_checker::{DirtyCheckProperty, DirtyChecker};
pub use locator::{ObjectAdapter, ObserverLocator, TargetObserverLocator};
pub use primitive_observer::PrimitiveObserver;
pub use property_accessor::{HostPropertyAccessor, PropertyAccessor};
pub use proxy_observer::{ProxyObserver, ProxyPropertyObserver};
pub use setter_observer::{CustomSetterObserver, SetterObserver};
pub use subscribers::SubscriberRegistry;
