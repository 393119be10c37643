// ============================================================================
// spark-observe - Dirty Checker
// Polling fallback for properties that cannot be intercepted
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::subscribers::SubscriberRegistry;
use crate::config::DirtyCheckSettings;
use crate::core::constants::{FROM_TICK, UPDATE_TARGET_INSTANCE};
use crate::core::context::untrack;
use crate::core::error::{Error, Result};
use crate::core::types::{Accessor, PropertyObserver, PropertySubscriber};
use crate::core::value::{Value, WeakTarget};

// =============================================================================
// DIRTY CHECKER
// =============================================================================

/// Polls every subscribed dirty-check property once every
/// `frames_per_check` calls to [`DirtyChecker::tick`].
pub struct DirtyChecker {
    settings: Cell<DirtyCheckSettings>,
    tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
    elapsed_frames: Cell<u32>,
    self_weak: Weak<DirtyChecker>,
}

impl DirtyChecker {
    pub fn new(settings: DirtyCheckSettings) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            settings: Cell::new(settings),
            tracked: RefCell::new(Vec::new()),
            elapsed_frames: Cell::new(0),
            self_weak: self_weak.clone(),
        })
    }

    pub fn settings(&self) -> DirtyCheckSettings {
        self.settings.get()
    }

    pub fn set_settings(&self, settings: DirtyCheckSettings) {
        self.settings.set(settings);
    }

    /// Observer for a property that has no better strategy.
    pub fn create_property(&self, target: &Value, key: &str) -> Result<Rc<DirtyCheckProperty>> {
        let settings = self.settings.get();
        if settings.throw {
            return Err(Error::UnobservableProperty(key.to_string()));
        }
        if settings.warn {
            tracing::warn!(kind = target.kind(), key, "property observed by dirty checking");
        }
        Ok(Rc::new_cyclic(|self_weak| DirtyCheckProperty {
            checker: self.self_weak.clone(),
            target: target.downgrade(),
            key: Rc::from(key),
            old_value: RefCell::new(Value::Undefined),
            subscribers: SubscriberRegistry::new(),
            self_weak: self_weak.clone(),
        }))
    }

    /// Number of properties currently polled.
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    fn add_property(&self, property: Rc<DirtyCheckProperty>) {
        self.tracked.borrow_mut().push(property);
    }

    fn remove_property(&self, property: &Rc<DirtyCheckProperty>) {
        self.tracked.borrow_mut().retain(|p| !Rc::ptr_eq(p, property));
    }

    /// Advance one scheduler frame, checking every property when due.
    pub fn tick(&self) {
        let settings = self.settings.get();
        if settings.disabled {
            return;
        }
        let frames = self.elapsed_frames.get() + 1;
        if frames < settings.frames_per_check {
            self.elapsed_frames.set(frames);
            return;
        }
        self.elapsed_frames.set(0);
        self.check();
    }

    /// Check every tracked property now.
    pub fn check(&self) {
        let tracked: Vec<_> = self.tracked.borrow().clone();
        let mut changed = 0usize;
        for property in tracked {
            if property.is_dirty() {
                property.flush(FROM_TICK);
                changed += 1;
            }
        }
        tracing::trace!(changed, "dirty check pass");
    }
}

// =============================================================================
// DIRTY CHECK PROPERTY
// =============================================================================

/// One polled property.
///
/// Registered with its checker while it has at least one subscriber.
pub struct DirtyCheckProperty {
    checker: Weak<DirtyChecker>,
    target: WeakTarget,
    key: Rc<str>,
    old_value: RefCell<Value>,
    subscribers: SubscriberRegistry<dyn PropertySubscriber>,
    self_weak: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    pub fn is_dirty(&self) -> bool {
        *self.old_value.borrow() != self.get_value()
    }

    /// Notify subscribers of the current value and remember it.
    pub fn flush(&self, flags: u32) {
        let new = self.get_value();
        let old = self.old_value.replace(new.clone());
        let flags = flags | UPDATE_TARGET_INSTANCE;
        self.subscribers.broadcast(|s| s.handle_change(&new, &old, flags));
    }
}

impl Accessor for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.target
            .upgrade()
            .map(|target| untrack(|| target.get_property(&self.key)))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value, _flags: u32) {
        if let Some(target) = self.target.upgrade() {
            target.set_property(&self.key, value);
        }
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn subscribe(&self, subscriber: Rc<dyn PropertySubscriber>) -> bool {
        if self.subscribers.is_empty() {
            *self.old_value.borrow_mut() = self.get_value();
            if let (Some(checker), Some(this)) = (self.checker.upgrade(), self.self_weak.upgrade()) {
                checker.add_property(this);
            }
        }
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn PropertySubscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && self.subscribers.is_empty() {
            if let (Some(checker), Some(this)) = (self.checker.upgrade(), self.self_weak.upgrade()) {
                checker.remove_property(&this);
            }
        }
        removed
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    fn as_accessor(self: Rc<Self>) -> Rc<dyn Accessor> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
